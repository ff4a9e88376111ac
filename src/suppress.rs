// 该文件是 Shanan （山南西风） 项目的一部分。
// src/suppress.rs - 置信度过滤与逐类别非极大值抑制
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

use std::{cmp::Ordering, collections::BTreeMap};

use tracing::debug;

use crate::{
  config::RetinaConfig,
  detection::{DetectItem, DetectResult},
  error::{Result, RetinaError},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suppressor {
  /// 分类置信度阈值
  cls_threshold: f32,
  /// NMS IoU 阈值，IoU >= 阈值即抑制
  nms_threshold: f32,
  use_suppression: bool,
  max_detections: Option<usize>,
}

/// 分数降序，同分时锚框下标小者优先
fn by_score_desc(a: &DetectItem, b: &DetectItem) -> Ordering {
  b.score
    .total_cmp(&a.score)
    .then_with(|| a.anchor_index.cmp(&b.anchor_index))
}

impl Suppressor {
  pub fn new(cls_threshold: f32, nms_threshold: f32) -> Result<Self> {
    for (name, v) in [("cls_thrs", cls_threshold), ("nms_thrs", nms_threshold)] {
      if !(0.0..=1.0).contains(&v) {
        return Err(RetinaError::invalid(format!(
          "{} 必须在 [0, 1] 内, 实际为 {}",
          name, v
        )));
      }
    }
    Ok(Self {
      cls_threshold,
      nms_threshold,
      use_suppression: true,
      max_detections: None,
    })
  }

  pub fn from_config(config: &RetinaConfig) -> Result<Self> {
    Ok(
      Self::new(config.cls_thrs, config.nms_thrs)?
        .use_suppression(config.use_suppression)
        .max_detections(config.max_detections),
    )
  }

  pub fn use_suppression(mut self, enabled: bool) -> Self {
    self.use_suppression = enabled;
    self
  }

  pub fn max_detections(mut self, limit: Option<usize>) -> Self {
    self.max_detections = limit;
    self
  }

  /// 对单张图像的候选框执行阈值过滤与逐类别 NMS，返回新的结果序列。
  ///
  /// 输出按类别升序排列，类别内按分数降序。
  pub fn suppress(&self, candidates: &DetectResult) -> DetectResult {
    let mut groups: BTreeMap<u32, Vec<DetectItem>> = BTreeMap::new();
    for item in candidates.iter() {
      if item.score >= self.cls_threshold {
        groups.entry(item.class_id).or_default().push(*item);
      }
    }

    let mut kept = Vec::new();
    for (class_id, mut group) in groups {
      group.sort_by(by_score_desc);
      let before = group.len();
      if self.use_suppression {
        self.greedy_nms(&group, &mut kept);
      } else {
        kept.extend(group);
      }
      debug!(
        "类别 {}: {} 个候选，保留 {} 个",
        class_id,
        before,
        kept.iter().filter(|d| d.class_id == class_id).count()
      );
    }

    if let Some(limit) = self.max_detections.filter(|&n| n < kept.len()) {
      // 跨类别按分数取前 N 个，再恢复类别升序
      kept.sort_by(by_score_desc);
      kept.truncate(limit);
      kept.sort_by(|a, b| a.class_id.cmp(&b.class_id).then_with(|| by_score_desc(a, b)));
    }

    debug!("NMS 完成: {} -> {}", candidates.len(), kept.len());
    DetectResult::from(kept)
  }

  /// group 已按分数降序
  fn greedy_nms(&self, group: &[DetectItem], kept: &mut Vec<DetectItem>) {
    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      let best = group[i];
      for (j, det) in group.iter().enumerate().skip(i + 1) {
        if !suppressed[j] && best.bbox.iou(&det.bbox) >= self.nms_threshold {
          suppressed[j] = true;
        }
      }
      kept.push(best);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::boxes::{BBox, iou};

  fn det(class_id: u32, score: f32, bbox: [f32; 4], anchor_index: usize) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox: BBox::from(bbox),
      anchor_index,
    }
  }

  #[test]
  fn empty_input_gives_empty_output() {
    let s = Suppressor::new(0.5, 0.5).unwrap();
    assert!(s.suppress(&DetectResult::default()).is_empty());
  }

  #[test]
  fn threshold_drops_low_scores() {
    let s = Suppressor::new(0.5, 0.5).unwrap();
    let input = DetectResult::from(vec![
      det(0, 0.3, [0.0, 0.0, 10.0, 10.0], 0),
      det(0, 0.6, [50.0, 50.0, 60.0, 60.0], 1),
    ]);
    let out = s.suppress(&input);
    assert_eq!(out.len(), 1);
    assert_eq!(out.items[0].score, 0.6);
  }

  #[test]
  fn overlapping_lower_score_is_suppressed() {
    // IoU = 75 / 125 = 0.6
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [0.0, 2.5, 10.0, 12.5];
    assert!((iou(&BBox::from(a), &BBox::from(b)) - 0.6).abs() < 1e-6);

    let s = Suppressor::new(0.0, 0.5).unwrap();
    let input = DetectResult::from(vec![det(1, 0.8, b, 1), det(1, 0.9, a, 0)]);
    let out = s.suppress(&input);
    assert_eq!(out.len(), 1);
    assert_eq!(out.items[0].score, 0.9);
  }

  #[test]
  fn iou_exactly_at_threshold_suppresses() {
    // IoU = 50 / 150 = 1/3；阈值取同一计算值
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(5.0, 0.0, 15.0, 10.0);
    let threshold = iou(&a, &b);
    let s = Suppressor::new(0.0, threshold).unwrap();
    let input = DetectResult::from(vec![
      det(0, 0.9, a.as_array(), 0),
      det(0, 0.8, b.as_array(), 1),
    ]);
    assert_eq!(s.suppress(&input).len(), 1);

    let s = Suppressor::new(0.0, threshold + 1e-4).unwrap();
    assert_eq!(s.suppress(&input).len(), 2);
  }

  #[test]
  fn classes_are_suppressed_independently_and_ordered() {
    let s = Suppressor::new(0.1, 0.5).unwrap();
    let same = [0.0, 0.0, 10.0, 10.0];
    let input = DetectResult::from(vec![
      det(2, 0.4, same, 0),
      det(0, 0.7, same, 1),
      det(2, 0.95, [40.0, 40.0, 50.0, 50.0], 2),
      det(0, 0.5, same, 3),
      det(1, 0.2, same, 4),
    ]);
    let out: Vec<_> = s
      .suppress(&input)
      .iter()
      .map(|d| (d.class_id, d.score))
      .collect();
    assert_eq!(out, vec![(0, 0.7), (1, 0.2), (2, 0.95), (2, 0.4)]);
  }

  #[test]
  fn equal_scores_prefer_lower_anchor_index() {
    let s = Suppressor::new(0.0, 0.5).unwrap();
    let same = [0.0, 0.0, 10.0, 10.0];
    let input = DetectResult::from(vec![det(0, 0.5, same, 7), det(0, 0.5, same, 3)]);
    let out = s.suppress(&input);
    assert_eq!(out.len(), 1);
    assert_eq!(out.items[0].anchor_index, 3);
  }

  #[test]
  fn single_candidate_is_kept() {
    let s = Suppressor::new(0.5, 0.0).unwrap();
    let input = DetectResult::from(vec![det(4, 0.5, [0.0, 0.0, 1.0, 1.0], 0)]);
    assert_eq!(s.suppress(&input).len(), 1);
  }

  #[test]
  fn disabled_suppression_only_thresholds() {
    let s = Suppressor::new(0.5, 0.5).unwrap().use_suppression(false);
    let same = [0.0, 0.0, 10.0, 10.0];
    let input = DetectResult::from(vec![
      det(0, 0.6, same, 0),
      det(0, 0.9, same, 1),
      det(0, 0.1, same, 2),
    ]);
    let out: Vec<_> = s.suppress(&input).iter().map(|d| d.score).collect();
    assert_eq!(out, vec![0.9, 0.6]);
  }

  #[test]
  fn max_detections_keeps_top_scores_across_classes() {
    let s = Suppressor::new(0.0, 0.5).unwrap().max_detections(Some(2));
    let input = DetectResult::from(vec![
      det(1, 0.9, [0.0, 0.0, 10.0, 10.0], 0),
      det(0, 0.3, [20.0, 20.0, 30.0, 30.0], 1),
      det(0, 0.8, [40.0, 40.0, 50.0, 50.0], 2),
    ]);
    let out: Vec<_> = s
      .suppress(&input)
      .iter()
      .map(|d| (d.class_id, d.score))
      .collect();
    assert_eq!(out, vec![(0, 0.8), (1, 0.9)]);
  }

  #[test]
  fn max_detections_prefers_high_score_from_higher_class() {
    let s = Suppressor::new(0.0, 0.5).unwrap().max_detections(Some(1));
    let input = DetectResult::from(vec![
      det(0, 0.1, [0.0, 0.0, 10.0, 10.0], 0),
      det(5, 0.99, [40.0, 40.0, 50.0, 50.0], 1),
    ]);
    let out: Vec<_> = s
      .suppress(&input)
      .iter()
      .map(|d| (d.class_id, d.score))
      .collect();
    assert_eq!(out, vec![(5, 0.99)]);
  }

  #[test]
  fn max_detections_ties_go_to_lower_anchor_index() {
    let s = Suppressor::new(0.0, 0.5).unwrap().max_detections(Some(1));
    let input = DetectResult::from(vec![
      det(3, 0.7, [0.0, 0.0, 10.0, 10.0], 8),
      det(1, 0.7, [40.0, 40.0, 50.0, 50.0], 2),
    ]);
    let out = s.suppress(&input);
    assert_eq!(out.len(), 1);
    assert_eq!(out.items[0].anchor_index, 2);
  }

  #[test]
  fn suppression_chain_keeps_non_overlapping_survivor() {
    // b 与 a 重叠被抑制，c 只与 b 重叠，因此保留
    let s = Suppressor::new(0.0, 0.5).unwrap();
    let input = DetectResult::from(vec![
      det(0, 0.9, [0.0, 0.0, 10.0, 10.0], 0),
      det(0, 0.8, [2.0, 0.0, 12.0, 10.0], 1),
      det(0, 0.7, [9.0, 0.0, 19.0, 10.0], 2),
    ]);
    let out: Vec<_> = s.suppress(&input).iter().map(|d| d.anchor_index).collect();
    assert_eq!(out, vec![0, 2]);
  }
}
