// 该文件是 Shanan （山南西风） 项目的一部分。
// src/anchor/generator.rs - 锚框生成
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

use tracing::debug;

use crate::{
  anchor::{Anchor, AnchorSet, AnchorTag, Resolution},
  boxes::CenterBox,
  config::{AnchorConfig, PyramidLevel},
  error::Result,
};

/// 锚框宽高公式，编码与解码共用。
///
/// aspect 定义为 宽/高：
/// `width = base * scale * sqrt(aspect)`, `height = base * scale / sqrt(aspect)`
pub fn anchor_shape(base_size: f32, aspect: f32, scale: f32) -> (f32, f32) {
  let sqrt_aspect = aspect.sqrt();
  (
    base_size * scale * sqrt_aspect,
    base_size * scale / sqrt_aspect,
  )
}

#[derive(Debug, Clone)]
pub struct AnchorGenerator {
  config: AnchorConfig,
}

impl AnchorGenerator {
  pub fn new(config: AnchorConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &AnchorConfig {
    &self.config
  }

  /// 特征网格大小 (行, 列)，不足一个步长的边缘按一格计
  pub fn grid_size(level: &PyramidLevel, resolution: Resolution) -> (usize, usize) {
    let stride = level.stride as usize;
    (
      (resolution.height as usize).div_ceil(stride),
      (resolution.width as usize).div_ceil(stride),
    )
  }

  /// 不生成锚框，仅计算其数量
  pub fn count(&self, resolution: Resolution) -> usize {
    let per_location = self.config.anchors_per_location();
    self
      .config
      .levels
      .iter()
      .map(|level| {
        let (rows, cols) = Self::grid_size(level, resolution);
        rows * cols * per_location
      })
      .sum()
  }

  /// 按 层 → 网格（行优先）→ 长宽比 → 尺度 的顺序生成锚框
  pub fn generate(&self, resolution: Resolution) -> AnchorSet {
    let mut anchors = Vec::with_capacity(self.count(resolution));

    for (level_idx, level) in self.config.levels.iter().enumerate() {
      let (rows, cols) = Self::grid_size(level, resolution);
      let stride = level.stride as f32;

      let shapes: Vec<(usize, usize, f32, f32)> = self
        .config
        .aspect_ratios
        .iter()
        .enumerate()
        .flat_map(|(ai, &aspect)| {
          self
            .config
            .scale_ratios
            .iter()
            .enumerate()
            .map(move |(si, &scale)| {
              let (w, h) = anchor_shape(level.base_size, aspect, scale);
              (ai, si, w, h)
            })
        })
        .collect();

      for row in 0..rows {
        for col in 0..cols {
          let cx = (col as f32 + 0.5) * stride;
          let cy = (row as f32 + 0.5) * stride;
          for &(aspect_index, scale_index, w, h) in &shapes {
            anchors.push(Anchor {
              bbox: CenterBox::new(cx, cy, w, h).to_corner(),
              tag: AnchorTag {
                level: level_idx,
                row,
                col,
                aspect_index,
                scale_index,
              },
            });
          }
        }
      }

      debug!(
        "层 {} (步长 {}): 网格 {}x{}, 每格 {} 个锚框",
        level_idx,
        level.stride,
        rows,
        cols,
        shapes.len()
      );
    }

    debug!(
      "分辨率 {}x{} 共生成 {} 个锚框",
      resolution.width,
      resolution.height,
      anchors.len()
    );
    AnchorSet::new(resolution, anchors)
  }
}
