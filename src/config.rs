// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 编解码配置
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

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  anchor::Resolution,
  boxes::Bounds,
  error::{Result, RetinaError},
};

const FILE_CONFIG_SCHEME: &str = "file";
const RETINA_CONFIG_SCHEME: &str = "retina";

/// 特征金字塔的一层
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PyramidLevel {
  pub stride: u32,
  pub base_size: f32,
}

/// RetinaNet P3-P7
pub const RETINA_LEVELS: [PyramidLevel; 5] = [
  PyramidLevel {
    stride: 8,
    base_size: 32.0,
  },
  PyramidLevel {
    stride: 16,
    base_size: 64.0,
  },
  PyramidLevel {
    stride: 32,
    base_size: 128.0,
  },
  PyramidLevel {
    stride: 64,
    base_size: 256.0,
  },
  PyramidLevel {
    stride: 128,
    base_size: 512.0,
  },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
  pub aspect_ratios: Vec<f32>,
  pub scale_ratios: Vec<f32>,
  #[serde(default = "default_levels")]
  pub levels: Vec<PyramidLevel>,
}

fn default_levels() -> Vec<PyramidLevel> {
  RETINA_LEVELS.to_vec()
}

impl Default for AnchorConfig {
  fn default() -> Self {
    Self {
      aspect_ratios: vec![0.5, 1.0, 2.0],
      scale_ratios: vec![1.0, 2f32.powf(1.0 / 3.0), 2f32.powf(2.0 / 3.0)],
      levels: default_levels(),
    }
  }
}

fn check_ratios(name: &str, ratios: &[f32]) -> Result<()> {
  if ratios.is_empty() {
    return Err(RetinaError::invalid(format!("{} 不能为空", name)));
  }
  if let Some(bad) = ratios.iter().find(|r| !(r.is_finite() && **r > 0.0)) {
    return Err(RetinaError::invalid(format!(
      "{} 必须全部为正数, 发现 {}",
      name, bad
    )));
  }
  Ok(())
}

fn check_unit(name: &str, value: f32) -> Result<()> {
  if !(0.0..=1.0).contains(&value) {
    return Err(RetinaError::invalid(format!(
      "{} 必须在 [0, 1] 内, 实际为 {}",
      name, value
    )));
  }
  Ok(())
}

impl AnchorConfig {
  /// 每个网格位置的锚框数 = |aspect_ratios| × |scale_ratios|
  pub fn anchors_per_location(&self) -> usize {
    self.aspect_ratios.len() * self.scale_ratios.len()
  }

  /// 最大步长，输入尺寸需对齐到它的整数倍
  pub fn max_stride(&self) -> u32 {
    self.levels.iter().map(|l| l.stride).max().unwrap_or(1)
  }

  pub fn validate(&self) -> Result<()> {
    check_ratios("aspect_ratios", &self.aspect_ratios)?;
    check_ratios("scale_ratios", &self.scale_ratios)?;
    if self.levels.is_empty() {
      return Err(RetinaError::invalid("金字塔层不能为空"));
    }
    for level in &self.levels {
      if level.stride == 0 || !(level.base_size.is_finite() && level.base_size > 0.0) {
        return Err(RetinaError::invalid(format!(
          "金字塔层参数无效: 步长 {}, 基础尺寸 {}",
          level.stride, level.base_size
        )));
      }
    }
    Ok(())
  }
}

/// 网络输入尺寸策略
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSizing {
  pub short_dim: u32,
  pub long_dim: u32,
  #[serde(default)]
  pub fixed_h: Option<u32>,
  #[serde(default)]
  pub fixed_w: Option<u32>,
}

impl Default for InputSizing {
  fn default() -> Self {
    Self {
      short_dim: 512,
      long_dim: 1024,
      fixed_h: None,
      fixed_w: None,
    }
  }
}

/// 原始图像到网络输入的映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
  pub image: Bounds,
  pub resolution: Resolution,
  /// 网络坐标乘以该系数得到原图坐标
  pub scale_x: f32,
  pub scale_y: f32,
}

impl InputSizing {
  pub fn validate(&self) -> Result<()> {
    if self.short_dim == 0 || self.long_dim == 0 {
      return Err(RetinaError::invalid("short_dim 与 long_dim 必须为正"));
    }
    if self.short_dim > self.long_dim {
      return Err(RetinaError::invalid(format!(
        "short_dim ({}) 不能大于 long_dim ({})",
        self.short_dim, self.long_dim
      )));
    }
    match (self.fixed_h, self.fixed_w) {
      (None, None) => Ok(()),
      (Some(h), Some(w)) if h > 0 && w > 0 => Ok(()),
      _ => Err(RetinaError::invalid("fixed_h 与 fixed_w 必须同时设置且为正")),
    }
  }

  /// 计算网络输入分辨率。
  ///
  /// 固定尺寸时直接拉伸；否则等比缩放使短边为 `short_dim` 且长边不超过 `long_dim`，
  /// 再向上填充到 `align` 的整数倍（填充不改变缩放系数）。
  pub fn resolve(&self, image: Bounds, align: u32) -> Result<ResizePlan> {
    if image.width == 0 || image.height == 0 {
      return Err(RetinaError::invalid(format!(
        "图像尺寸无效: {}x{}",
        image.width, image.height
      )));
    }
    let (img_w, img_h) = (image.width as f32, image.height as f32);

    if let (Some(fixed_h), Some(fixed_w)) = (self.fixed_h, self.fixed_w) {
      return Ok(ResizePlan {
        image,
        resolution: Resolution::new(fixed_h, fixed_w),
        scale_x: img_w / fixed_w as f32,
        scale_y: img_h / fixed_h as f32,
      });
    }

    let short = img_w.min(img_h);
    let long = img_w.max(img_h);
    let mut scale = self.short_dim as f32 / short;
    if long * scale > self.long_dim as f32 {
      scale = self.long_dim as f32 / long;
    }

    let align = align.max(1);
    let pad = |v: f32| -> u32 { ((v.round() as u32).max(1)).div_ceil(align) * align };

    Ok(ResizePlan {
      image,
      resolution: Resolution::new(pad(img_h * scale), pad(img_w * scale)),
      scale_x: 1.0 / scale,
      scale_y: 1.0 / scale,
    })
  }
}

fn default_high_iou() -> f32 {
  0.5
}

fn default_low_iou() -> f32 {
  0.4
}

fn default_true() -> bool {
  true
}

fn default_num_threads() -> usize {
  1
}

/// 完整配置，字段与训练流水线的 data_encoder / data_decoder 参数对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetinaConfig {
  #[serde(flatten)]
  pub anchors: AnchorConfig,
  #[serde(flatten)]
  pub sizing: InputSizing,
  pub num_classes: usize,
  /// 分类置信度阈值
  pub cls_thrs: f32,
  /// NMS IoU 阈值
  pub nms_thrs: f32,
  #[serde(default = "default_high_iou")]
  pub high_iou: f32,
  #[serde(default = "default_low_iou")]
  pub low_iou: f32,
  #[serde(default = "default_true")]
  pub use_suppression: bool,
  #[serde(default = "default_true")]
  pub clip_boxes: bool,
  /// 0 表示由线程池自行决定
  #[serde(default = "default_num_threads")]
  pub num_threads: usize,
  #[serde(default)]
  pub max_detections: Option<usize>,
}

impl Default for RetinaConfig {
  fn default() -> Self {
    Self {
      anchors: AnchorConfig::default(),
      sizing: InputSizing::default(),
      num_classes: 80,
      cls_thrs: 0.5,
      nms_thrs: 0.5,
      high_iou: default_high_iou(),
      low_iou: default_low_iou(),
      use_suppression: true,
      clip_boxes: true,
      num_threads: default_num_threads(),
      max_detections: None,
    }
  }
}

impl RetinaConfig {
  pub fn num_anchors(&self) -> usize {
    self.anchors.anchors_per_location()
  }

  pub fn validate(&self) -> Result<()> {
    self.anchors.validate()?;
    self.sizing.validate()?;
    if self.num_classes == 0 {
      return Err(RetinaError::invalid("num_classes 必须为正"));
    }
    check_unit("cls_thrs", self.cls_thrs)?;
    check_unit("nms_thrs", self.nms_thrs)?;
    check_unit("high_iou", self.high_iou)?;
    check_unit("low_iou", self.low_iou)?;
    if self.low_iou > self.high_iou {
      return Err(RetinaError::invalid(format!(
        "low_iou ({}) 不能大于 high_iou ({})",
        self.low_iou, self.high_iou
      )));
    }
    Ok(())
  }

  pub fn resolve(&self, image: Bounds) -> Result<ResizePlan> {
    self.sizing.resolve(image, self.anchors.max_stride())
  }

  fn apply_query(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
      "aspect_ratios" => self.anchors.aspect_ratios = parse_list(key, value)?,
      "scale_ratios" => self.anchors.scale_ratios = parse_list(key, value)?,
      "strides" => {
        let strides: Vec<u32> = parse_list(key, value)?;
        self.anchors.levels = resize_levels(&self.anchors.levels, strides.len());
        for (level, stride) in self.anchors.levels.iter_mut().zip(strides) {
          level.stride = stride;
        }
      }
      "base_sizes" => {
        let sizes: Vec<f32> = parse_list(key, value)?;
        self.anchors.levels = resize_levels(&self.anchors.levels, sizes.len());
        for (level, size) in self.anchors.levels.iter_mut().zip(sizes) {
          level.base_size = size;
        }
      }
      "short_dim" => self.sizing.short_dim = parse_value(key, value)?,
      "long_dim" => self.sizing.long_dim = parse_value(key, value)?,
      "fixed_h" => self.sizing.fixed_h = Some(parse_value(key, value)?),
      "fixed_w" => self.sizing.fixed_w = Some(parse_value(key, value)?),
      "num_classes" => self.num_classes = parse_value(key, value)?,
      "cls_thrs" => self.cls_thrs = parse_value(key, value)?,
      "nms_thrs" => self.nms_thrs = parse_value(key, value)?,
      "high_iou" => self.high_iou = parse_value(key, value)?,
      "low_iou" => self.low_iou = parse_value(key, value)?,
      "use_suppression" => self.use_suppression = parse_value(key, value)?,
      "clip_boxes" => self.clip_boxes = parse_value(key, value)?,
      "num_threads" => self.num_threads = parse_value(key, value)?,
      "max_detections" => self.max_detections = Some(parse_value(key, value)?),
      _ => warn!("忽略未知配置项: {}={}", key, value),
    }
    Ok(())
  }
}

fn resize_levels(levels: &[PyramidLevel], len: usize) -> Vec<PyramidLevel> {
  let fallback = levels.last().copied().unwrap_or(RETINA_LEVELS[0]);
  (0..len)
    .map(|i| levels.get(i).copied().unwrap_or(fallback))
    .collect()
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.trim().parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>, ConfigError> {
  value
    .split(',')
    .filter(|s| !s.trim().is_empty())
    .map(|s| parse_value(key, s))
    .collect()
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("配置项 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error(transparent)]
  Invalid(#[from] RetinaError),
}

impl FromUrl for RetinaConfig {
  type Error = ConfigError;

  /// `file:///path/config.json` 读取 JSON 配置；
  /// `retina:?aspect_ratios=0.5,1,2&...` 在默认值上覆盖查询参数
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let config = match url.scheme() {
      FILE_CONFIG_SCHEME => {
        info!("读取配置文件: {}", url.path());
        let data = std::fs::read(url.path())?;
        serde_json::from_slice::<RetinaConfig>(&data)?
      }
      RETINA_CONFIG_SCHEME => {
        let mut config = RetinaConfig::default();
        for (k, v) in url.query_pairs() {
          config.apply_query(&k, &v)?;
        }
        config
      }
      other => {
        error!(
          "URI scheme mismatch: expected '{}' or '{}', found '{}'",
          FILE_CONFIG_SCHEME, RETINA_CONFIG_SCHEME, other
        );
        return Err(ConfigError::SchemeMismatch(other.to_string()));
      }
    };

    config.validate()?;
    info!(
      "配置加载完成: 长宽比 {:?}, 尺度 {:?}, 每位置锚框数 {}, 类别数 {}",
      config.anchors.aspect_ratios,
      config.anchors.scale_ratios,
      config.num_anchors(),
      config.num_classes
    );
    Ok(config)
  }
}
