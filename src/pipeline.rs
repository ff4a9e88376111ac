// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 训练编码与推理解码流水线
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
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  anchor::{AnchorCache, AnchorGenerator, Resolution},
  boxes::Bounds,
  config::{ConfigError, ResizePlan, RetinaConfig},
  decoder::OutputDecoder,
  detection::{Annotation, DetectItem, DetectResult},
  encoder::{EncodedTargets, TargetEncoder},
  error::RetinaError,
  suppress::Suppressor,
};

pub trait Pipeline {
  type Input;
  type Output;
  type Error;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("编解码错误: {0}")]
  RetinaError(#[from] RetinaError),
}

/// 模型推理协作方给出的单张图像原始输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
  pub image_id: String,
  /// 原始图像宽高
  pub width: u32,
  pub height: u32,
  pub regression: Vec<[f32; 4]>,
  /// 锚框 × 类别 展平
  pub scores: Vec<f32>,
}

/// 数据加载协作方给出的单张训练图像标注（原始图像坐标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
  pub image_id: String,
  pub width: u32,
  pub height: u32,
  #[serde(default)]
  pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedImage {
  pub image_id: String,
  pub detections: DetectResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedImage {
  pub image_id: String,
  pub resolution: Resolution,
  pub targets: EncodedTargets,
}

fn bounds_of(width: u32, height: u32) -> Bounds {
  Bounds { width, height }
}

/// 推理路径：解码 → 阈值过滤与 NMS → 映射回原图
#[derive(Debug)]
pub struct RetinaDecodePipeline {
  config: RetinaConfig,
  cache: AnchorCache,
  decoder: OutputDecoder,
  suppressor: Suppressor,
}

impl RetinaDecodePipeline {
  pub fn new(config: RetinaConfig) -> Result<Self, RetinaError> {
    config.validate()?;
    let cache = AnchorCache::new(AnchorGenerator::new(config.anchors.clone())?);
    let decoder = OutputDecoder::from_config(&config)?;
    let suppressor = Suppressor::from_config(&config)?;
    info!(
      "解码流水线就绪: 分类阈值 {}, NMS 阈值 {}, 抑制 {}",
      config.cls_thrs,
      config.nms_thrs,
      if config.use_suppression { "开启" } else { "关闭" }
    );
    Ok(Self {
      config,
      cache,
      decoder,
      suppressor,
    })
  }

  pub fn config(&self) -> &RetinaConfig {
    &self.config
  }

  pub fn cache(&self) -> &AnchorCache {
    &self.cache
  }

  pub fn plan(&self, width: u32, height: u32) -> Result<ResizePlan, RetinaError> {
    self.config.resolve(bounds_of(width, height))
  }

  /// 网络坐标下的检测结果，不做尺寸还原
  pub fn detect(
    &self,
    resolution: Resolution,
    regression: &[[f32; 4]],
    scores: &[f32],
  ) -> Result<DetectResult, RetinaError> {
    let anchors = self.cache.get_or_build(resolution);
    let candidates = self.decoder.decode(&anchors, regression, scores)?;
    Ok(self.suppressor.suppress(&candidates))
  }
}

impl FromUrl for RetinaDecodePipeline {
  type Error = PipelineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let config = RetinaConfig::from_url(url)?;
    Ok(Self::new(config)?)
  }
}

impl Pipeline for RetinaDecodePipeline {
  type Input = PredictionRecord;
  type Output = DecodedImage;
  type Error = RetinaError;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let plan = self.plan(input.width, input.height)?;
    debug!(
      "图像 {} ({}x{}) -> 网络输入 {}x{}",
      input.image_id,
      input.width,
      input.height,
      plan.resolution.width,
      plan.resolution.height
    );
    let detections = self.detect(plan.resolution, &input.regression, &input.scores)?;
    let mut detections = detections.rescale(&plan);
    if self.config.clip_boxes {
      // 填充区域映射回原图后可能越界
      let items = detections
        .iter()
        .filter_map(|item| {
          item
            .bbox
            .clip(plan.image)
            .map(|bbox| DetectItem { bbox, ..*item })
        })
        .collect::<Vec<_>>();
      detections = DetectResult::from(items);
    }
    Ok(DecodedImage {
      image_id: input.image_id.clone(),
      detections,
    })
  }
}

/// 训练路径：真值 → 逐锚框目标
#[derive(Debug)]
pub struct RetinaEncodePipeline {
  config: RetinaConfig,
  cache: AnchorCache,
  encoder: TargetEncoder,
}

impl RetinaEncodePipeline {
  pub fn new(config: RetinaConfig) -> Result<Self, RetinaError> {
    config.validate()?;
    let cache = AnchorCache::new(AnchorGenerator::new(config.anchors.clone())?);
    let encoder = TargetEncoder::from_config(&config)?;
    info!(
      "编码流水线就绪: 前景阈值 {}, 背景阈值 {}",
      config.high_iou, config.low_iou
    );
    Ok(Self {
      config,
      cache,
      encoder,
    })
  }

  pub fn config(&self) -> &RetinaConfig {
    &self.config
  }

  pub fn cache(&self) -> &AnchorCache {
    &self.cache
  }
}

impl FromUrl for RetinaEncodePipeline {
  type Error = PipelineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let config = RetinaConfig::from_url(url)?;
    Ok(Self::new(config)?)
  }
}

impl Pipeline for RetinaEncodePipeline {
  type Input = AnnotationRecord;
  type Output = EncodedImage;
  type Error = RetinaError;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let plan = self.config.resolve(bounds_of(input.width, input.height))?;
    let anchors = self.cache.get_or_build(plan.resolution);
    let (sx, sy) = (1.0 / plan.scale_x, 1.0 / plan.scale_y);
    let annotations = input
      .annotations
      .iter()
      .map(|a| Annotation::new(a.bbox.scale(sx, sy), a.class_id))
      .collect::<Vec<_>>();
    let targets = self.encoder.encode(&anchors, &annotations)?;
    Ok(EncodedImage {
      image_id: input.image_id.clone(),
      resolution: plan.resolution,
      targets,
    })
  }
}
