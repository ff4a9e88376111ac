// 该文件是 Shanan （山南西风） 项目的一部分。
// src/boxes.rs - 边界框几何运算
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

/// 角点形式的边界框 [x_min, y_min, x_max, y_max]，单位为输入像素
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

/// 中心形式的边界框 [cx, cy, w, h]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterBox {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

/// 图像边界（宽、高）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
  pub width: u32,
  pub height: u32,
}

impl BBox {
  pub const fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  pub fn width(&self) -> f32 {
    self.x_max - self.x_min
  }

  pub fn height(&self) -> f32 {
    self.y_max - self.y_min
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  /// 宽高均为正且坐标有限
  pub fn is_valid(&self) -> bool {
    self.width() > 0.0 && self.height() > 0.0 && self.as_array().iter().all(|v| v.is_finite())
  }

  pub fn as_array(&self) -> [f32; 4] {
    [self.x_min, self.y_min, self.x_max, self.y_max]
  }

  pub fn to_center(&self) -> CenterBox {
    let w = self.width();
    let h = self.height();
    CenterBox {
      cx: self.x_min + 0.5 * w,
      cy: self.y_min + 0.5 * h,
      w,
      h,
    }
  }

  /// 与另一个框的交集面积
  pub fn intersection(&self, other: &BBox) -> f32 {
    let x1 = self.x_min.max(other.x_min);
    let y1 = self.y_min.max(other.y_min);
    let x2 = self.x_max.min(other.x_max);
    let y2 = self.y_max.min(other.y_max);

    (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
  }

  pub fn iou(&self, other: &BBox) -> f32 {
    iou(self, other)
  }

  /// 截断到图像边界内，截断后宽或高不为正时返回 None
  pub fn clip(&self, bounds: Bounds) -> Option<BBox> {
    let (w, h) = (bounds.width as f32, bounds.height as f32);
    let clipped = BBox {
      x_min: self.x_min.clamp(0.0, w),
      y_min: self.y_min.clamp(0.0, h),
      x_max: self.x_max.clamp(0.0, w),
      y_max: self.y_max.clamp(0.0, h),
    };
    clipped.is_valid().then_some(clipped)
  }

  /// 按比例缩放坐标，用于映射回原始图像尺寸
  pub fn scale(&self, sx: f32, sy: f32) -> BBox {
    BBox {
      x_min: self.x_min * sx,
      y_min: self.y_min * sy,
      x_max: self.x_max * sx,
      y_max: self.y_max * sy,
    }
  }
}

impl From<[f32; 4]> for BBox {
  fn from(v: [f32; 4]) -> Self {
    BBox::new(v[0], v[1], v[2], v[3])
  }
}

impl From<BBox> for [f32; 4] {
  fn from(b: BBox) -> Self {
    b.as_array()
  }
}

impl CenterBox {
  pub const fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self { cx, cy, w, h }
  }

  pub fn to_corner(&self) -> BBox {
    let half_w = 0.5 * self.w;
    let half_h = 0.5 * self.h;
    BBox {
      x_min: self.cx - half_w,
      y_min: self.cy - half_h,
      x_max: self.cx + half_w,
      y_max: self.cy + half_h,
    }
  }
}

impl From<CenterBox> for BBox {
  fn from(c: CenterBox) -> Self {
    c.to_corner()
  }
}

impl From<BBox> for CenterBox {
  fn from(b: BBox) -> Self {
    b.to_center()
  }
}

/// 交并比，结果在 [0, 1] 内，不相交或并集为零时返回 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let inter = a.intersection(b);
  if inter <= 0.0 {
    return 0.0;
  }
  let union = a.area() + b.area() - inter;
  if union > 0.0 {
    (inter / union).clamp(0.0, 1.0)
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f32 = 1e-5;

  #[test]
  fn iou_is_symmetric() {
    let pairs = [
      (BBox::new(0.0, 0.0, 10.0, 10.0), BBox::new(5.0, 5.0, 15.0, 15.0)),
      (BBox::new(1.0, 2.0, 7.5, 9.0), BBox::new(0.0, 0.0, 3.0, 3.0)),
      (BBox::new(-4.0, -4.0, 4.0, 4.0), BBox::new(-1.0, -2.0, 1.0, 2.0)),
    ];
    for (a, b) in pairs {
      assert!((iou(&a, &b) - iou(&b, &a)).abs() < EPS);
    }
  }

  #[test]
  fn iou_with_itself_is_one() {
    let a = BBox::new(3.0, 4.0, 13.5, 20.25);
    assert!((iou(&a, &a) - 1.0).abs() < EPS);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(20.0, 20.0, 30.0, 30.0);
    assert_eq!(iou(&a, &b), 0.0);
    // 仅边相接
    let c = BBox::new(10.0, 0.0, 20.0, 10.0);
    assert_eq!(iou(&a, &c), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(5.0, 0.0, 15.0, 10.0);
    assert!((iou(&a, &b) - 50.0 / 150.0).abs() < EPS);
  }

  #[test]
  fn center_corner_round_trip() {
    let a = BBox::new(12.5, -3.0, 40.0, 17.75);
    let back = a.to_center().to_corner();
    for (x, y) in a.as_array().iter().zip(back.as_array()) {
      assert!((x - y).abs() < EPS);
    }

    let c = CenterBox::new(100.0, 50.0, 64.0, 32.0);
    let back = c.to_corner().to_center();
    assert!((c.cx - back.cx).abs() < EPS);
    assert!((c.cy - back.cy).abs() < EPS);
    assert!((c.w - back.w).abs() < EPS);
    assert!((c.h - back.h).abs() < EPS);
  }

  #[test]
  fn clip_truncates_to_bounds() {
    let bounds = Bounds {
      width: 100,
      height: 50,
    };
    let clipped = BBox::new(-10.0, 10.0, 120.0, 40.0).clip(bounds).unwrap();
    assert_eq!(clipped, BBox::new(0.0, 10.0, 100.0, 40.0));
  }

  #[test]
  fn clip_outside_bounds_is_invalid() {
    let bounds = Bounds {
      width: 100,
      height: 50,
    };
    assert!(BBox::new(110.0, 10.0, 130.0, 40.0).clip(bounds).is_none());
    assert!(BBox::new(10.0, -30.0, 20.0, -1.0).clip(bounds).is_none());
  }

  #[test]
  fn bbox_serializes_as_array() {
    let b = BBox::new(1.0, 2.0, 3.0, 4.0);
    let json = serde_json::to_string(&b).unwrap();
    assert_eq!(json, "[1.0,2.0,3.0,4.0]");
    let back: BBox = serde_json::from_str(&json).unwrap();
    assert_eq!(back, b);
  }
}
