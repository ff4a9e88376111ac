// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/retina_encode.rs - 训练目标编码
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_retina::{
  FromUrl,
  input::InputWrapper,
  output::OutputWrapper,
  pipeline::{AnnotationRecord, RetinaEncodePipeline},
  task::{BatchTask, Task},
};
use tracing::info;

/// RetinaNet 训练目标编码参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置，`file:///path.json` 或 `retina:?high_iou=0.5&...`
  #[arg(long, value_name = "CONFIG")]
  pub config: Url,
  /// 标注记录来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 编码结果输出
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 覆盖配置中的线程数
  #[arg(long, value_name = "THREADS")]
  pub threads: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("配置: {}", args.config);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let pipeline = RetinaEncodePipeline::from_url(&args.config)?;
  let mut input = InputWrapper::<AnnotationRecord>::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let threads = args.threads.unwrap_or(pipeline.config().num_threads);
  BatchTask::default()
    .with_num_threads(threads)
    .with_frame_number(args.frame_number)
    .run_task(&mut input, pipeline, output)?;

  input.finish()?;

  Ok(())
}
