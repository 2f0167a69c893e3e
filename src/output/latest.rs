// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/latest.rs - 最新画面
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

use std::collections::BTreeMap;
use std::sync::Arc;

use image::{RgbaImage, imageops};
use parking_lot::RwLock;

use super::{OutputError, SurfaceSink};
use crate::renderer::OverlayKind;

/// 每种叠加层保留最新一帧，供嵌入方的合成器读取
#[derive(Debug, Default)]
pub struct LatestSurface {
  layers: RwLock<BTreeMap<OverlayKind, Arc<RgbaImage>>>,
}

impl LatestSurface {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, kind: OverlayKind) -> Option<Arc<RgbaImage>> {
    self.layers.read().get(&kind).cloned()
  }

  pub fn kinds(&self) -> Vec<OverlayKind> {
    self.layers.read().keys().copied().collect()
  }

  /// 按叠放顺序合成所有叠加层；没有任何画面时返回 `None`
  pub fn composite(&self) -> Option<RgbaImage> {
    let layers = self.layers.read();
    let width = layers.values().map(|layer| layer.width()).max()?;
    let height = layers.values().map(|layer| layer.height()).max()?;
    let mut base = RgbaImage::new(width, height);
    for kind in OverlayKind::ALL {
      if let Some(layer) = layers.get(&kind) {
        imageops::overlay(&mut base, layer.as_ref(), 0, 0);
      }
    }
    Some(base)
  }
}

impl SurfaceSink for LatestSurface {
  fn present(&self, kind: OverlayKind, surface: &RgbaImage) -> Result<(), OutputError> {
    self.layers.write().insert(kind, Arc::new(surface.clone()));
    Ok(())
  }

  fn withdraw(&self, kind: OverlayKind) {
    self.layers.write().remove(&kind);
  }
}
