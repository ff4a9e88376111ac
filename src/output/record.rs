// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 目录记录输出
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{RecordLines, Render},
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编号不能作为文件名: {0:?}")]
  InvalidImageId(String),
}

/// `<image_id>.txt`，编号中保留原有的点号
fn record_file_name(image_id: &str) -> Result<String, RecordOutputError> {
  if image_id.is_empty()
    || image_id == "."
    || image_id == ".."
    || image_id.contains(['/', '\\', '\0'])
  {
    return Err(RecordOutputError::InvalidImageId(image_id.to_string()));
  }
  Ok(format!("{}.txt", image_id))
}

/// 每张图像一个 `<image_id>.txt`
pub struct RecordOutput {
  directory: PathBuf,
  /// 无结果时是否也写出空文件
  always: bool,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch);
    }

    let directory = PathBuf::from(uri.path());
    if !directory.exists() {
      info!("创建记录目录: {}", directory.display());
      std::fs::create_dir_all(&directory)?;
    }
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(RecordOutput { directory, always })
  }
}

impl<F, D: RecordLines> Render<F, D> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, _frame: &F, result: &D) -> Result<(), Self::Error> {
    let file_name = record_file_name(result.record_name())?;
    let lines = result.record_lines();
    if lines.is_empty() && !self.always {
      debug!("{} 无结果，跳过", result.record_name());
      return Ok(());
    }
    let path = self.directory.join(file_name);
    std::fs::write(&path, lines.join("\n"))?;
    debug!("写出 {} 行到 {}", lines.len(), path.display());
    Ok(())
  }
}
