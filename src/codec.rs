// 该文件是 Shanan （山南西风） 项目的一部分。
// src/codec.rs - 锚框偏移编码约定
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

//! 编码器与解码器共用的唯一偏移约定（中心形式，无方差缩放）：
//!
//! ```text
//! tx = (gx - ax) / aw     ty = (gy - ay) / ah
//! tw = ln(gw / aw)        th = ln(gh / ah)
//! ```

use crate::boxes::{BBox, CenterBox};

/// 解码时 tw/th 的上限，防止 exp 溢出
pub const SIZE_OFFSET_CLAMP: f32 = 4.135_166_6; // ln(1000 / 16)

/// 计算真值框相对锚框的回归偏移
pub fn encode(anchor: &BBox, target: &BBox) -> [f32; 4] {
  let a = anchor.to_center();
  let g = target.to_center();
  [
    (g.cx - a.cx) / a.w,
    (g.cy - a.cy) / a.h,
    (g.w / a.w).ln(),
    (g.h / a.h).ln(),
  ]
}

/// `encode` 的逆运算
pub fn decode(anchor: &BBox, offsets: &[f32; 4]) -> BBox {
  let a = anchor.to_center();
  let [tx, ty, tw, th] = *offsets;
  CenterBox::new(
    a.cx + tx * a.w,
    a.cy + ty * a.h,
    a.w * tw.min(SIZE_OFFSET_CLAMP).exp(),
    a.h * th.min(SIZE_OFFSET_CLAMP).exp(),
  )
  .to_corner()
}
