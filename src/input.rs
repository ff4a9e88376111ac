// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 逐图像记录输入
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

#[cfg(feature = "jsonl_input")]
use serde::de::DeserializeOwned;

#[cfg(feature = "jsonl_input")]
use crate::FromUrl;

#[cfg(feature = "jsonl_input")]
mod jsonl;
#[cfg(feature = "jsonl_input")]
pub use self::jsonl::{JsonLinesInput, JsonLinesInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "jsonl_input")]
  #[error("JSON lines input error: {0}")]
  JsonLinesInputError(#[from] JsonLinesInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

#[cfg(feature = "jsonl_input")]
pub enum InputWrapper<T> {
  JsonLines(JsonLinesInput<T>),
}

#[cfg(feature = "jsonl_input")]
impl<T> InputWrapper<T> {
  /// 输入读取结束后调用；读取中途发生 I/O 错误时返回该错误
  pub fn finish(self) -> Result<(), InputError> {
    match self {
      InputWrapper::JsonLines(input) => Ok(input.finish()?),
    }
  }
}

#[cfg(feature = "jsonl_input")]
impl<T> FromUrl for InputWrapper<T> {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if JsonLinesInput::<T>::accepts(url.scheme()) {
      let input = JsonLinesInput::from_url(url)?;
      return Ok(InputWrapper::JsonLines(input));
    }
    Err(InputError::SchemeMismatch)
  }
}

#[cfg(feature = "jsonl_input")]
impl<T: DeserializeOwned> Iterator for InputWrapper<T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::JsonLines(input) => input.next(),
    }
  }
}
