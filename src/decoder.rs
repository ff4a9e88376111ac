// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decoder.rs - 网络输出解码
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

use tracing::{debug, error, trace};

use crate::{
  anchor::AnchorSet,
  codec,
  config::RetinaConfig,
  detection::{DetectItem, DetectResult},
  error::{Result, RetinaError},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputDecoder {
  num_classes: usize,
  clip_boxes: bool,
  /// 低于该分数的候选在解码阶段直接跳过（始终要求分数大于 0）
  pre_filter: f32,
}

impl OutputDecoder {
  pub fn new(num_classes: usize) -> Result<Self> {
    if num_classes == 0 {
      return Err(RetinaError::invalid("num_classes 必须为正"));
    }
    Ok(Self {
      num_classes,
      clip_boxes: true,
      pre_filter: 0.0,
    })
  }

  pub fn from_config(config: &RetinaConfig) -> Result<Self> {
    Ok(Self::new(config.num_classes)?.clip_boxes(config.clip_boxes))
  }

  pub fn clip_boxes(mut self, clip: bool) -> Self {
    self.clip_boxes = clip;
    self
  }

  pub fn pre_filter(mut self, threshold: f32) -> Self {
    self.pre_filter = threshold.max(0.0);
    self
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  /// 解码逐锚框的回归值与分类分数。
  ///
  /// `scores` 按 锚框 × 类别 展平，且已归一化到 [0, 1]。
  /// 输出为阈值过滤前的全部候选（每个锚框每个类别至多一个）。
  pub fn decode(
    &self,
    anchors: &AnchorSet,
    regression: &[[f32; 4]],
    scores: &[f32],
  ) -> Result<DetectResult> {
    if anchors.is_empty() {
      return Err(RetinaError::EmptyAnchorSet);
    }
    if regression.len() != anchors.len() {
      error!(
        "回归输出数量 {} 与锚框数量 {} 不一致",
        regression.len(),
        anchors.len()
      );
      return Err(RetinaError::ShapeMismatch {
        what: "regression",
        expected: anchors.len(),
        actual: regression.len(),
      });
    }
    let expected_scores = anchors.len() * self.num_classes;
    if scores.len() != expected_scores {
      error!(
        "分类输出数量 {} 与 锚框×类别 {} 不一致",
        scores.len(),
        expected_scores
      );
      return Err(RetinaError::ShapeMismatch {
        what: "scores",
        expected: expected_scores,
        actual: scores.len(),
      });
    }

    let bounds = anchors.resolution().bounds();
    let mut items = Vec::new();
    let mut dropped = 0usize;

    for (anchor_index, ((anchor, offsets), class_scores)) in anchors
      .iter()
      .zip(regression)
      .zip(scores.chunks_exact(self.num_classes))
      .enumerate()
    {
      if class_scores
        .iter()
        .all(|&s| !(s > 0.0 && s >= self.pre_filter))
      {
        continue;
      }

      let decoded = codec::decode(&anchor.bbox, offsets);
      let bbox = if self.clip_boxes {
        match decoded.clip(bounds) {
          Some(b) => b,
          None => {
            trace!("锚框 {} 解码结果越界: {:?}", anchor_index, decoded);
            dropped += 1;
            continue;
          }
        }
      } else if decoded.is_valid() {
        decoded
      } else {
        dropped += 1;
        continue;
      };

      for (class_id, &score) in class_scores.iter().enumerate() {
        if score > 0.0 && score >= self.pre_filter {
          items.push(DetectItem {
            class_id: class_id as u32,
            score: score.min(1.0),
            bbox,
            anchor_index,
          });
        }
      }
    }

    debug!(
      "解码得到 {} 个候选框，丢弃 {} 个无效框",
      items.len(),
      dropped
    );
    Ok(DetectResult::from(items))
  }
}
