// 该文件是 Shanan （山南西风） 项目的一部分。
// src/anchor.rs - 锚框定义
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

use crate::boxes::{BBox, Bounds};

/// 网络输入分辨率，同时作为锚框缓存的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
  pub height: u32,
  pub width: u32,
}

impl Resolution {
  pub const fn new(height: u32, width: u32) -> Self {
    Self { height, width }
  }

  pub fn bounds(&self) -> Bounds {
    Bounds {
      width: self.width,
      height: self.height,
    }
  }
}

/// 生成锚框的位置信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnchorTag {
  pub level: usize,
  pub row: usize,
  pub col: usize,
  pub aspect_index: usize,
  pub scale_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
  pub bbox: BBox,
  pub tag: AnchorTag,
}

/// 某一分辨率下的有序锚框集合，发布后只读
#[derive(Debug, Clone)]
pub struct AnchorSet {
  resolution: Resolution,
  anchors: Box<[Anchor]>,
}

impl AnchorSet {
  pub(crate) fn new(resolution: Resolution, anchors: Vec<Anchor>) -> Self {
    Self {
      resolution,
      anchors: anchors.into_boxed_slice(),
    }
  }

  /// 由显式给定的框构造锚框集合（单层、单行网格）
  pub fn from_boxes(resolution: Resolution, boxes: impl IntoIterator<Item = BBox>) -> Self {
    let anchors = boxes
      .into_iter()
      .enumerate()
      .map(|(col, bbox)| Anchor {
        bbox,
        tag: AnchorTag {
          col,
          ..AnchorTag::default()
        },
      })
      .collect::<Vec<_>>();
    Self::new(resolution, anchors)
  }

  pub fn resolution(&self) -> Resolution {
    self.resolution
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn anchors(&self) -> &[Anchor] {
    &self.anchors
  }

  pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
    self.anchors.iter()
  }
}

mod cache;
mod generator;
pub use self::cache::AnchorCache;
pub use self::generator::{AnchorGenerator, anchor_shape};
