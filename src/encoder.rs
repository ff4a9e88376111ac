// 该文件是 Shanan （山南西风） 项目的一部分。
// src/encoder.rs - 训练目标编码
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
  anchor::AnchorSet,
  codec,
  config::RetinaConfig,
  detection::Annotation,
  error::{Result, RetinaError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassTarget {
  Background,
  /// 匹配质量模糊，不参与损失计算
  Ignore,
  Foreground(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnchorTarget {
  pub class: ClassTarget,
  /// 仅前景锚框有回归目标
  pub regression: Option<[f32; 4]>,
  /// 匹配到的真值下标
  pub matched: Option<usize>,
  /// 当前最佳匹配的 IoU
  pub iou: f32,
}

impl AnchorTarget {
  const BACKGROUND: AnchorTarget = AnchorTarget {
    class: ClassTarget::Background,
    regression: None,
    matched: None,
    iou: 0.0,
  };

  pub fn is_foreground(&self) -> bool {
    matches!(self.class, ClassTarget::Foreground(_))
  }
}

/// 单张图像的逐锚框训练目标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedTargets {
  pub targets: Box<[AnchorTarget]>,
}

impl EncodedTargets {
  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn class_targets(&self) -> impl Iterator<Item = ClassTarget> + '_ {
    self.targets.iter().map(|t| t.class)
  }

  pub fn regression_targets(&self) -> impl Iterator<Item = Option<[f32; 4]>> + '_ {
    self.targets.iter().map(|t| t.regression)
  }

  pub fn num_foreground(&self) -> usize {
    self.targets.iter().filter(|t| t.is_foreground()).count()
  }

  pub fn num_background(&self) -> usize {
    self
      .targets
      .iter()
      .filter(|t| t.class == ClassTarget::Background)
      .count()
  }

  pub fn num_ignore(&self) -> usize {
    self
      .targets
      .iter()
      .filter(|t| t.class == ClassTarget::Ignore)
      .count()
  }

  /// 分配给第 `gt` 个真值的锚框下标
  pub fn anchors_for(&self, gt: usize) -> impl Iterator<Item = usize> + '_ {
    self
      .targets
      .iter()
      .enumerate()
      .filter(move |(_, t)| t.is_foreground() && t.matched == Some(gt))
      .map(|(i, _)| i)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetEncoder {
  high_threshold: f32,
  low_threshold: f32,
  /// 设置后，类别编号不小于该值的真值被跳过
  num_classes: Option<usize>,
}

impl Default for TargetEncoder {
  fn default() -> Self {
    Self {
      high_threshold: 0.5,
      low_threshold: 0.4,
      num_classes: None,
    }
  }
}

impl TargetEncoder {
  pub fn new(high_threshold: f32, low_threshold: f32) -> Result<Self> {
    let unit = 0.0..=1.0;
    if !unit.contains(&high_threshold)
      || !unit.contains(&low_threshold)
      || low_threshold > high_threshold
    {
      return Err(RetinaError::invalid(format!(
        "IoU 阈值无效: low {}, high {}",
        low_threshold, high_threshold
      )));
    }
    Ok(Self {
      high_threshold,
      low_threshold,
      num_classes: None,
    })
  }

  pub fn from_config(config: &RetinaConfig) -> Result<Self> {
    Ok(Self::new(config.high_iou, config.low_iou)?.with_num_classes(Some(config.num_classes)))
  }

  pub fn with_num_classes(mut self, num_classes: Option<usize>) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn encode(&self, anchors: &AnchorSet, annotations: &[Annotation]) -> Result<EncodedTargets> {
    if anchors.is_empty() {
      return Err(RetinaError::EmptyAnchorSet);
    }

    let mut targets = vec![AnchorTarget::BACKGROUND; anchors.len()];

    let valid: Vec<usize> = annotations
      .iter()
      .enumerate()
      .filter_map(|(j, gt)| {
        if !gt.bbox.is_valid() {
          warn!("跳过无效真值框 {}: {:?}", j, gt.bbox);
          None
        } else if self
          .num_classes
          .is_some_and(|n| gt.class_id as usize >= n)
        {
          warn!("跳过类别越界的真值 {}: 类别 {}", j, gt.class_id);
          None
        } else {
          Some(j)
        }
      })
      .collect();

    if valid.is_empty() {
      debug!("没有真值框，全部锚框为背景");
      return Ok(EncodedTargets {
        targets: targets.into_boxed_slice(),
      });
    }

    // 每个真值的最佳锚框 (IoU, 锚框下标)，同 IoU 取最小下标
    let mut gt_best: Vec<(f32, usize)> = vec![(f32::NEG_INFINITY, 0); valid.len()];

    // 第一遍：逐锚框按阈值分配
    for (i, anchor) in anchors.iter().enumerate() {
      let mut best: Option<(f32, usize)> = None;
      for (slot, &j) in valid.iter().enumerate() {
        let v = anchor.bbox.iou(&annotations[j].bbox);
        if best.is_none_or(|(m, _)| v > m) {
          best = Some((v, j));
        }
        if v > gt_best[slot].0 {
          gt_best[slot] = (v, i);
        }
      }

      let Some((m, j)) = best else { continue };
      let target = &mut targets[i];
      target.iou = m;
      if m >= self.high_threshold {
        target.class = ClassTarget::Foreground(annotations[j].class_id);
        target.matched = Some(j);
      } else if m >= self.low_threshold {
        target.class = ClassTarget::Ignore;
      }
    }

    // 第二遍：保证每个真值至少有一个负责的锚框
    for (slot, &j) in valid.iter().enumerate() {
      let (v, i) = gt_best[slot];
      let target = &mut targets[i];
      if let Some(k) = target.matched.filter(|_| target.is_foreground()) {
        if k != j && (target.iou > v || (target.iou == v && k < j)) {
          debug!(
            "真值 {} 的最佳锚框 {} 已属于真值 {} (IoU {:.3} >= {:.3})",
            j, i, k, target.iou, v
          );
          continue;
        }
      }
      if v < self.high_threshold {
        debug!("强制将锚框 {} 分配给真值 {} (IoU {:.3})", i, j, v);
      }
      target.class = ClassTarget::Foreground(annotations[j].class_id);
      target.matched = Some(j);
      target.iou = v;
    }

    for (anchor, target) in anchors.iter().zip(targets.iter_mut()) {
      if let (ClassTarget::Foreground(_), Some(j)) = (target.class, target.matched) {
        target.regression = Some(codec::encode(&anchor.bbox, &annotations[j].bbox));
      } else {
        target.matched = None;
      }
    }

    let encoded = EncodedTargets {
      targets: targets.into_boxed_slice(),
    };
    debug!(
      "编码完成: 前景 {}, 背景 {}, 忽略 {}",
      encoded.num_foreground(),
      encoded.num_background(),
      encoded.num_ignore()
    );
    Ok(encoded)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{anchor::Resolution, boxes::BBox};

  fn anchors(boxes: &[[f32; 4]]) -> AnchorSet {
    AnchorSet::from_boxes(
      Resolution::new(100, 100),
      boxes.iter().copied().map(BBox::from),
    )
  }

  #[test]
  fn identical_anchor_is_foreground_with_zero_offsets() {
    let anchors = anchors(&[[10.0, 10.0, 20.0, 20.0]]);
    let gts = [Annotation::new(BBox::new(10.0, 10.0, 20.0, 20.0), 3)];
    let targets = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    assert_eq!(targets.targets[0].class, ClassTarget::Foreground(3));
    let reg = targets.targets[0].regression.unwrap();
    assert!(reg.iter().all(|v| v.abs() < 1e-6));
  }

  #[test]
  fn thresholds_split_foreground_ignore_background() {
    let gt = BBox::new(0.0, 0.0, 10.0, 10.0);
    let anchors = anchors(&[
      [0.0, 0.0, 10.0, 10.0], // IoU 1
      [0.0, 0.0, 10.0, 22.0], // IoU 100/220 ≈ 0.4545
      [0.0, 0.0, 10.0, 40.0], // IoU 0.25
      [50.0, 50.0, 60.0, 60.0],
    ]);
    let targets = TargetEncoder::default()
      .encode(&anchors, &[Annotation::new(gt, 1)])
      .unwrap();
    let classes: Vec<_> = targets.class_targets().collect();
    assert_eq!(
      classes,
      vec![
        ClassTarget::Foreground(1),
        ClassTarget::Ignore,
        ClassTarget::Background,
        ClassTarget::Background,
      ]
    );
    assert!(targets.targets[1].regression.is_none());
    assert!(targets.targets[2].regression.is_none());
    assert_eq!(targets.num_ignore(), 1);
  }

  #[test]
  fn no_ground_truth_means_all_background() {
    let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [5.0, 5.0, 15.0, 15.0]]);
    let targets = TargetEncoder::default().encode(&anchors, &[]).unwrap();
    assert_eq!(targets.num_background(), 2);
    assert!(targets.regression_targets().all(|r| r.is_none()));
  }

  #[test]
  fn empty_anchor_set_is_an_error() {
    let anchors = anchors(&[]);
    assert_eq!(
      TargetEncoder::default().encode(&anchors, &[]),
      Err(RetinaError::EmptyAnchorSet)
    );
  }

  #[test]
  fn forced_assignment_covers_low_overlap_ground_truth() {
    // 最大 IoU 仅 0.25，低于两个阈值
    let anchors = anchors(&[[0.0, 0.0, 10.0, 40.0], [60.0, 60.0, 70.0, 70.0]]);
    let gts = [Annotation::new(BBox::new(0.0, 0.0, 10.0, 10.0), 7)];
    let targets = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    assert_eq!(targets.targets[0].class, ClassTarget::Foreground(7));
    assert!(targets.targets[0].regression.is_some());
    assert_eq!(targets.anchors_for(0).collect::<Vec<_>>(), vec![0]);
    assert_eq!(targets.targets[1].class, ClassTarget::Background);
  }

  #[test]
  fn forced_assignment_breaks_anchor_ties_by_lowest_index() {
    // 两个锚框与真值的 IoU 相同
    let anchors = anchors(&[[0.0, 0.0, 10.0, 40.0], [0.0, -30.0, 10.0, 10.0]]);
    let gts = [Annotation::new(BBox::new(0.0, 0.0, 10.0, 10.0), 2)];
    let targets = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    assert_eq!(targets.targets[0].class, ClassTarget::Foreground(2));
    assert_eq!(targets.targets[1].class, ClassTarget::Background);
  }

  #[test]
  fn forced_assignment_keeps_higher_iou_owner() {
    // 锚框 0 与真值 0 完全重合；真值 1 的最佳锚框同样是锚框 0，但 IoU 更低
    let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [80.0, 80.0, 90.0, 90.0]]);
    let gts = [
      Annotation::new(BBox::new(0.0, 0.0, 10.0, 10.0), 1),
      Annotation::new(BBox::new(5.0, 0.0, 15.0, 10.0), 2),
    ];
    let targets = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    assert_eq!(targets.targets[0].class, ClassTarget::Foreground(1));
    assert_eq!(targets.targets[0].matched, Some(0));
  }

  #[test]
  fn ground_truth_ties_go_to_lower_index() {
    // 两个真值与锚框 IoU 相同
    let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0]]);
    let gts = [
      Annotation::new(BBox::new(0.0, 0.0, 10.0, 20.0), 4),
      Annotation::new(BBox::new(0.0, -10.0, 10.0, 10.0), 5),
    ];
    let targets = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    assert_eq!(targets.targets[0].class, ClassTarget::Foreground(4));
    assert_eq!(targets.targets[0].matched, Some(0));
  }

  #[test]
  fn invalid_ground_truth_is_skipped() {
    let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0]]);
    let gts = [Annotation::new(BBox::new(5.0, 5.0, 5.0, 9.0), 1)];
    let targets = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    assert_eq!(targets.num_background(), 1);
  }

  #[test]
  fn forced_assignment_goes_to_later_ground_truth_with_higher_iou() {
    // 两个真值都低于前景阈值且最佳锚框相同：IoU 0.3 与 0.4
    let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [50.0, 50.0, 60.0, 60.0]]);
    let gts = [
      Annotation::new(BBox::new(0.0, 0.0, 10.0, 3.0), 1),
      Annotation::new(BBox::new(0.0, 0.0, 10.0, 4.0), 2),
    ];
    let encoded = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    let t = encoded.targets[0];
    assert_eq!(t.class, ClassTarget::Foreground(2));
    assert_eq!(t.matched, Some(1));
    assert!((t.iou - 0.4).abs() < 1e-6);
    assert_eq!(encoded.anchors_for(0).count(), 0);
  }

  #[test]
  fn forced_assignment_equal_iou_keeps_lower_ground_truth() {
    // 两个真值与锚框 0 的 IoU 都是 0.3
    let anchors = anchors(&[[0.0, 0.0, 10.0, 10.0], [50.0, 50.0, 60.0, 60.0]]);
    let gts = [
      Annotation::new(BBox::new(0.0, 0.0, 10.0, 3.0), 1),
      Annotation::new(BBox::new(0.0, 7.0, 10.0, 10.0), 2),
    ];
    let encoded = TargetEncoder::default().encode(&anchors, &gts).unwrap();
    let t = encoded.targets[0];
    assert_eq!(t.class, ClassTarget::Foreground(1));
    assert_eq!(t.matched, Some(0));
    assert_eq!(encoded.anchors_for(1).count(), 0);
  }

  #[test]
  fn out_of_range_class_is_skipped() {
    let anchors = anchors(&[[10.0, 10.0, 20.0, 20.0], [40.0, 40.0, 50.0, 50.0]]);
    let gts = [
      Annotation::new(BBox::new(10.0, 10.0, 20.0, 20.0), 7),
      Annotation::new(BBox::new(40.0, 40.0, 50.0, 50.0), 1),
    ];
    let encoder = TargetEncoder::default().with_num_classes(Some(2));
    let encoded = encoder.encode(&anchors, &gts).unwrap();
    assert_eq!(encoded.targets[0].class, ClassTarget::Background);
    assert_eq!(encoded.targets[1].class, ClassTarget::Foreground(1));
    assert_eq!(encoded.num_foreground(), 1);
  }

  #[test]
  fn rejects_inverted_thresholds() {
    assert!(TargetEncoder::new(0.4, 0.5).is_err());
    assert!(TargetEncoder::new(1.2, 0.5).is_err());
    assert!(TargetEncoder::new(0.5, 0.5).is_ok());
  }
}
