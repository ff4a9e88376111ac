// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/retina_anchors.rs - 锚框生成检查
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
  anchor::{AnchorGenerator, Resolution},
  boxes::Bounds,
  config::RetinaConfig,
};
use tracing::info;

/// 打印给定图像尺寸下的网络输入分辨率与锚框数量
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[arg(long, value_name = "CONFIG", default_value = "retina:")]
  pub config: Url,
  /// 原始图像宽度
  #[arg(long)]
  pub width: u32,
  /// 原始图像高度
  #[arg(long)]
  pub height: u32,
  /// 以 JSON 形式输出全部锚框
  #[arg(long)]
  pub dump: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("配置: {}", args.config);

  let config = RetinaConfig::from_url(&args.config)?;
  let plan = config.resolve(Bounds {
    width: args.width,
    height: args.height,
  })?;
  let generator = AnchorGenerator::new(config.anchors.clone())?;
  let Resolution { height, width } = plan.resolution;

  println!(
    "image {}x{} -> network {}x{} (scale {:.4}, {:.4})",
    args.width, args.height, width, height, plan.scale_x, plan.scale_y
  );
  for (level, pyramid) in config.anchors.levels.iter().enumerate() {
    let (rows, cols) = AnchorGenerator::grid_size(pyramid, plan.resolution);
    println!(
      "P{} stride {:>3} base {:>5}: {}x{} cells",
      level + 3,
      pyramid.stride,
      pyramid.base_size,
      rows,
      cols
    );
  }
  println!(
    "anchors per location: {}, total: {}",
    config.num_anchors(),
    generator.count(plan.resolution)
  );

  if args.dump {
    let anchors = generator.generate(plan.resolution);
    let boxes: Vec<[f32; 4]> = anchors.iter().map(|a| a.bbox.as_array()).collect();
    println!("{}", serde_json::to_string(&boxes)?);
  }

  Ok(())
}
