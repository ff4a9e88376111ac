// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/jsonl.rs - JSON Lines 记录输入
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
  io::{BufRead, BufReader, ErrorKind},
  marker::PhantomData,
};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::FromUrl;

#[derive(Error, Debug)]
pub enum JsonLinesInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

const JSONL_FILE_SCHEME: &str = "jsonl";
const JSONL_STDIN_SCHEME: &str = "stdin";

/// 每行一个 JSON 记录；非 UTF-8 或无法解析的行记录日志后跳过。
///
/// 读取发生 I/O 错误时迭代结束，错误由 [`JsonLinesInput::finish`] 返回。
pub struct JsonLinesInput<T> {
  reader: Box<dyn BufRead + Send>,
  line_no: usize,
  failure: Option<std::io::Error>,
  _phantom: PhantomData<T>,
}

impl<T> JsonLinesInput<T> {
  pub fn accepts(scheme: &str) -> bool {
    scheme == JSONL_FILE_SCHEME || scheme == JSONL_STDIN_SCHEME
  }

  pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
    Self {
      reader: Box::new(reader),
      line_no: 0,
      failure: None,
      _phantom: PhantomData,
    }
  }

  pub fn finish(self) -> Result<(), JsonLinesInputError> {
    match self.failure {
      Some(e) => Err(e.into()),
      None => Ok(()),
    }
  }
}

impl<T> FromUrl for JsonLinesInput<T> {
  type Error = JsonLinesInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JSONL_FILE_SCHEME => {
        info!("打开输入文件: {}", url.path());
        let file = File::open(url.path())?;
        Ok(Self::from_reader(BufReader::new(file)))
      }
      JSONL_STDIN_SCHEME => {
        info!("从标准输入读取记录");
        Ok(Self::from_reader(BufReader::new(std::io::stdin())))
      }
      other => {
        error!(
          "URI scheme mismatch: expected '{}' or '{}', found '{}'",
          JSONL_FILE_SCHEME, JSONL_STDIN_SCHEME, other
        );
        Err(JsonLinesInputError::SchemaMismatch)
      }
    }
  }
}

impl<T: DeserializeOwned> Iterator for JsonLinesInput<T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failure.is_some() {
      return None;
    }
    let mut line = Vec::new();
    loop {
      line.clear();
      match self.reader.read_until(b'\n', &mut line) {
        Ok(0) => {
          debug!("输入结束，共 {} 行", self.line_no);
          return None;
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => {
          error!("读取第 {} 行失败: {}", self.line_no + 1, e);
          self.failure = Some(e);
          return None;
        }
      }
      self.line_no += 1;

      let text = match std::str::from_utf8(&line) {
        Ok(text) => text.trim(),
        Err(e) => {
          error!("第 {} 行不是有效的 UTF-8，跳过: {}", self.line_no, e);
          continue;
        }
      };
      if text.is_empty() {
        continue;
      }
      match serde_json::from_str(text) {
        Ok(record) => return Some(record),
        Err(e) => {
          error!("第 {} 行解析失败，跳过: {}", self.line_no, e);
          continue;
        }
      }
    }
  }
}
