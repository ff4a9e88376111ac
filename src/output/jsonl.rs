// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/jsonl.rs - JSON Lines 结果输出
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  sync::{Mutex, PoisonError},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每个结果写一行 JSON，写入后立即刷新
pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesOutput {
  pub const STDOUT_SCHEME: &'static str = "stdout";

  pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
    }
  }
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      Self::SCHEME => {
        info!("输出到文件: {}", url.path());
        let file = File::create(url.path())?;
        Ok(Self::from_writer(BufWriter::new(file)))
      }
      Self::STDOUT_SCHEME => Ok(Self::from_writer(std::io::stdout())),
      other => {
        error!("不支持的输出方案: {}", other);
        Err(JsonLinesOutputError::SchemeMismatch)
      }
    }
  }
}

impl<F, D: Serialize> Render<F, D> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, _frame: &F, result: &D) -> Result<(), Self::Error> {
    let line = serde_json::to_string(result)?;
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    boxes::BBox,
    detection::{DetectItem, DetectResult},
    pipeline::DecodedImage,
  };

  #[test]
  fn writes_one_line_per_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.jsonl");
    let url = Url::parse(&format!("jsonl://{}", path.display())).unwrap();
    let output = JsonLinesOutput::from_url(&url).unwrap();

    let decoded = DecodedImage {
      image_id: "img".into(),
      detections: DetectResult::from(vec![DetectItem {
        class_id: 2,
        score: 0.5,
        bbox: BBox::new(1.0, 2.0, 3.0, 4.0),
        anchor_index: 9,
      }]),
    };
    output.render_result(&(), &decoded).unwrap();
    output.render_result(&(), &decoded).unwrap();
    drop(output);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(value["image_id"], "img");
    assert_eq!(value["detections"]["items"][0]["class_id"], 2);
    assert_eq!(
      value["detections"]["items"][0]["bbox"],
      serde_json::json!([1.0, 2.0, 3.0, 4.0])
    );
  }

  #[test]
  fn rejects_unknown_scheme() {
    let url = Url::parse("folder:///tmp").unwrap();
    assert!(matches!(
      JsonLinesOutput::from_url(&url),
      Err(JsonLinesOutputError::SchemeMismatch)
    ));
  }
}
