// 该文件是 Shanan （山南西风） 项目的一部分。
// src/error.rs - 锚框编解码错误定义
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

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetinaError {
  #[error("配置无效: {0}")]
  InvalidConfiguration(String),
  #[error("形状不匹配: {what} 期望长度 {expected}, 实际长度 {actual}")]
  ShapeMismatch {
    what: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("锚框集合为空")]
  EmptyAnchorSet,
}

impl RetinaError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    RetinaError::InvalidConfiguration(msg.into())
  }
}

pub type Result<T, E = RetinaError> = std::result::Result<T, E>;
