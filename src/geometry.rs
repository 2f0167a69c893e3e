// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 视频帧几何与坐标映射
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

//! 检测坐标（原生分辨率）到显示矩形像素坐标的映射。
//!
//! 视频元素可能被缩放、加黑边或随窗口改变大小，且不保证保持原始宽高比，
//! 因此两个轴分别独立缩放。

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

/// 解码尚未开始时（源报告 0）使用的默认原生分辨率
pub const DEFAULT_NATIVE_WIDTH: u32 = 1920;
pub const DEFAULT_NATIVE_HEIGHT: u32 = 1080;

/// 轴对齐矩形 `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "[f32; 4]")]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
  fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
    Self { x1, y1, x2, y2 }
  }
}

impl BoundingBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn to_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

/// 每次渲染都需要重新读取的视频几何信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFrameGeometry {
  pub native_width: u32,
  pub native_height: u32,
  pub display_width: u32,
  pub display_height: u32,
}

impl NativeFrameGeometry {
  pub fn new(native_width: u32, native_height: u32, display_width: u32, display_height: u32) -> Self {
    Self {
      native_width,
      native_height,
      display_width,
      display_height,
    }
  }

  /// 原生分辨率，0 被替换为默认值
  pub fn effective_native(&self) -> (u32, u32) {
    let width = if self.native_width == 0 {
      DEFAULT_NATIVE_WIDTH
    } else {
      self.native_width
    };
    let height = if self.native_height == 0 {
      DEFAULT_NATIVE_HEIGHT
    } else {
      self.native_height
    };
    (width, height)
  }
}

/// 原生坐标到显示坐标的纯函数映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  scale_x: f32,
  scale_y: f32,
}

impl CoordinateMapper {
  pub fn new(geometry: &NativeFrameGeometry) -> Self {
    let (native_width, native_height) = geometry.effective_native();
    Self {
      scale_x: geometry.display_width as f32 / native_width as f32,
      scale_y: geometry.display_height as f32 / native_height as f32,
    }
  }

  pub fn scale(&self) -> (f32, f32) {
    (self.scale_x, self.scale_y)
  }

  pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale_x, y * self.scale_y)
  }

  pub fn map_box(&self, bbox: BoundingBox) -> BoundingBox {
    let (x1, y1) = self.map_point(bbox.x1, bbox.y1);
    let (x2, y2) = self.map_point(bbox.x2, bbox.y2);
    BoundingBox { x1, y1, x2, y2 }
  }
}

/// 视频几何信息来源
///
/// 实现必须能在任意线程上被渲染循环调用；尺寸随窗口变化而变化，
/// 调用方不得跨帧缓存结果。
pub trait FrameGeometryProvider: Send + Sync {
  fn geometry(&self) -> NativeFrameGeometry;
}

/// 固定几何信息，用于测试和固定尺寸输出
#[derive(Debug, Clone, Copy)]
pub struct FixedGeometry(pub NativeFrameGeometry);

impl FrameGeometryProvider for FixedGeometry {
  fn geometry(&self) -> NativeFrameGeometry {
    self.0
  }
}

/// 播放管线维护的实时几何信息
///
/// 播放端在解码出首帧、窗口缩放或切换全屏时更新，渲染端每帧读取。
#[derive(Debug, Clone, Default)]
pub struct PlaybackSurface {
  inner: Arc<RwLock<NativeFrameGeometry>>,
}

impl Default for NativeFrameGeometry {
  fn default() -> Self {
    Self::new(0, 0, 0, 0)
  }
}

impl PlaybackSurface {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_native_resolution(&self, width: u32, height: u32) {
    let mut geometry = self.inner.write();
    geometry.native_width = width;
    geometry.native_height = height;
  }

  pub fn set_display_rect(&self, width: u32, height: u32) {
    let mut geometry = self.inner.write();
    geometry.display_width = width;
    geometry.display_height = height;
  }
}

impl FrameGeometryProvider for PlaybackSurface {
  fn geometry(&self) -> NativeFrameGeometry {
    *self.inner.read()
  }
}
