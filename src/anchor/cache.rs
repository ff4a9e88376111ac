// 该文件是 Shanan （山南西风） 项目的一部分。
// src/anchor/cache.rs - 按分辨率缓存锚框
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
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use tracing::info;

use crate::anchor::{AnchorGenerator, AnchorSet, Resolution};

/// 锚框缓存：每个分辨率构建一次，发布后不再修改。
///
/// 配置变化时应整体替换缓存对象，而不是修改其中的条目。
#[derive(Debug)]
pub struct AnchorCache {
  generator: AnchorGenerator,
  sets: RwLock<HashMap<Resolution, Arc<AnchorSet>>>,
}

impl AnchorCache {
  pub fn new(generator: AnchorGenerator) -> Self {
    Self {
      generator,
      sets: RwLock::new(HashMap::new()),
    }
  }

  pub fn generator(&self) -> &AnchorGenerator {
    &self.generator
  }

  pub fn get(&self, resolution: Resolution) -> Option<Arc<AnchorSet>> {
    // 条目只插入不修改，锁中毒时数据仍然完整
    let sets = self.sets.read().unwrap_or_else(PoisonError::into_inner);
    sets.get(&resolution).cloned()
  }

  pub fn get_or_build(&self, resolution: Resolution) -> Arc<AnchorSet> {
    if let Some(set) = self.get(resolution) {
      return set;
    }

    let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
    // 等待写锁期间可能已有其他线程发布
    if let Some(set) = sets.get(&resolution) {
      return Arc::clone(set);
    }

    let set = Arc::new(self.generator.generate(resolution));
    info!(
      "发布分辨率 {}x{} 的锚框集合，共 {} 个",
      resolution.width,
      resolution.height,
      set.len()
    );
    sets.insert(resolution, Arc::clone(&set));
    set
  }

  pub fn len(&self) -> usize {
    self.sets.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
