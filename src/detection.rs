// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection.rs - 检测结果与标注定义
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

use serde::{Deserialize, Serialize};

use crate::{boxes::BBox, config::ResizePlan};

/// 真值标注
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
  pub bbox: BBox,
  pub class_id: u32,
}

impl Annotation {
  pub fn new(bbox: BBox, class_id: u32) -> Self {
    Self { bbox, class_id }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: BBox, // [x_min, y_min, x_max, y_max]
  /// 产生该候选框的锚框下标，用于同分时的确定性排序
  pub anchor_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &DetectItem> {
    self.items.iter()
  }

  /// 将网络坐标映射回原始图像坐标
  pub fn rescale(&self, plan: &ResizePlan) -> DetectResult {
    let items = self
      .items
      .iter()
      .map(|item| DetectItem {
        bbox: item.bbox.scale(plan.scale_x, plan.scale_y),
        ..*item
      })
      .collect::<Vec<_>>();
    DetectResult::from(items)
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}
