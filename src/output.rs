// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  encoder::ClassTarget,
  pipeline::{DecodedImage, EncodedImage},
};
#[cfg(any(feature = "jsonl_output", feature = "record_output"))]
use crate::FromUrlWithScheme;

/// 将一条输入记录及其处理结果写出
pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 以文本行形式记录的结果，每行 `class_id, score, x_min, y_min, x_max, y_max`
pub trait RecordLines {
  fn record_name(&self) -> &str;
  fn record_lines(&self) -> Vec<String>;
}

fn record_line(class_id: impl std::fmt::Display, score: f32, bbox: [f32; 4]) -> String {
  format!(
    "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
    class_id, score, bbox[0], bbox[1], bbox[2], bbox[3]
  )
}

impl RecordLines for DecodedImage {
  fn record_name(&self) -> &str {
    &self.image_id
  }

  fn record_lines(&self) -> Vec<String> {
    self
      .detections
      .iter()
      .map(|item| record_line(item.class_id, item.score, item.bbox.as_array()))
      .collect()
  }
}

/// 前景锚框：类别、匹配 IoU 与回归目标
impl RecordLines for EncodedImage {
  fn record_name(&self) -> &str {
    &self.image_id
  }

  fn record_lines(&self) -> Vec<String> {
    self
      .targets
      .targets
      .iter()
      .filter_map(|t| match (t.class, t.regression) {
        (ClassTarget::Foreground(class_id), Some(reg)) => Some(record_line(class_id, t.iou, reg)),
        _ => None,
      })
      .collect()
  }
}

#[cfg(feature = "jsonl_output")]
mod jsonl;
#[cfg(feature = "jsonl_output")]
pub use self::jsonl::{JsonLinesOutput, JsonLinesOutputError};

#[cfg(feature = "record_output")]
mod record;
#[cfg(feature = "record_output")]
pub use self::record::{RecordOutput, RecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "jsonl_output")]
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[cfg(feature = "record_output")]
  #[error("目录记录输出错误: {0}")]
  RecordOutputError(#[from] RecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "jsonl_output")]
  JsonLinesOutput(JsonLinesOutput),
  #[cfg(feature = "record_output")]
  RecordOutput(RecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "jsonl_output")]
      JsonLinesOutput::SCHEME | JsonLinesOutput::STDOUT_SCHEME => {
        let output = JsonLinesOutput::from_url(url)?;
        Ok(OutputWrapper::JsonLinesOutput(output))
      }
      #[cfg(feature = "record_output")]
      RecordOutput::SCHEME => {
        let output = RecordOutput::from_url(url)?;
        Ok(OutputWrapper::RecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<F, D: Serialize + RecordLines> Render<F, D> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &D) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLinesOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "record_output")]
      OutputWrapper::RecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = (frame, result);
        Err(OutputError::SchemeMismatch)
      }
    }
  }
}
