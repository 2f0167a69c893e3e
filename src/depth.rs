// 该文件是 Shanan （山南西风） 项目的一部分。
// src/depth.rs - 深度图解码
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

//! 深度图异步解码。
//!
//! 每个摄像头同一时间最多一个解码在途，期间到达的新帧只保留最新的一帧，
//! 在途解码完成后再解码它。解码失败时保留上一张可用的图像。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{DepthFrame, DepthStats};
use crate::snapshot::{SnapshotReader, SnapshotStore};

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("base64 解码错误: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("解码任务异常退出")]
  Join,
}

/// 可直接绘制的深度图
#[derive(Debug, Clone)]
pub struct DepthAsset {
  pub image: Arc<RgbaImage>,
  pub stats: DepthStats,
}

pub type DecodeFn = dyn Fn(&str) -> Result<RgbaImage, DecodeError> + Send + Sync;

/// base64 PNG 到 RGBA 图像
pub fn decode_png_base64(raster: &str) -> Result<RgbaImage, DecodeError> {
  let bytes = STANDARD.decode(raster.trim())?;
  let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?;
  Ok(image.to_rgba8())
}

#[derive(Default)]
struct DecodeSlot {
  in_flight: bool,
  pending: Option<DepthFrame>,
}

/// 单个摄像头的深度图解码器
#[derive(Clone)]
pub struct DepthImageDecoder {
  decode: Arc<DecodeFn>,
  slot: Arc<Mutex<DecodeSlot>>,
  store: Arc<SnapshotStore<Option<DepthAsset>>>,
  tickets: Arc<AtomicU64>,
}

impl Default for DepthImageDecoder {
  fn default() -> Self {
    Self::new()
  }
}

impl DepthImageDecoder {
  pub fn new() -> Self {
    Self::with_decoder(Arc::new(decode_png_base64))
  }

  pub fn with_decoder(decode: Arc<DecodeFn>) -> Self {
    Self {
      decode,
      slot: Arc::new(Mutex::new(DecodeSlot::default())),
      store: Arc::new(SnapshotStore::new(None)),
      tickets: Arc::new(AtomicU64::new(0)),
    }
  }

  /// 当前可绘制的深度图
  pub fn reader(&self) -> SnapshotReader<Option<DepthAsset>> {
    self.store.reader()
  }

  pub fn current(&self) -> Option<DepthAsset> {
    (*self.store.latest().data).clone()
  }

  /// 提交新帧，不阻塞调用方；必须在 tokio 运行时内调用
  pub fn submit(&self, frame: DepthFrame) {
    {
      let mut slot = self.slot.lock();
      if slot.in_flight {
        if slot.pending.replace(frame).is_some() {
          debug!("深度图解码中，丢弃被取代的待解码帧");
        }
        return;
      }
      slot.in_flight = true;
    }

    let decoder = self.clone();
    tokio::spawn(async move { decoder.drain(frame).await });
  }

  async fn drain(self, mut frame: DepthFrame) {
    loop {
      let decode = self.decode.clone();
      let raster = frame.raster.clone();
      let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
      let result = tokio::task::spawn_blocking(move || decode(&raster))
        .await
        .unwrap_or(Err(DecodeError::Join));

      match result {
        Ok(image) => {
          debug!("深度图解码完成: {}x{}", image.width(), image.height());
          self.store.publish(
            ticket,
            Some(DepthAsset {
              image: Arc::new(image),
              stats: frame.stats,
            }),
          );
        }
        Err(err) => warn!("深度图解码失败，保留上一张: {}", err),
      }

      let mut slot = self.slot.lock();
      match slot.pending.take() {
        Some(next) => frame = next,
        None => {
          slot.in_flight = false;
          return;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgba;
  use std::io::Cursor;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  fn png_base64(width: u32, height: u32) -> String {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    STANDARD.encode(bytes)
  }

  fn frame(raster: &str) -> DepthFrame {
    DepthFrame {
      raster: Arc::from(raster),
      stats: DepthStats {
        min_depth: 0.5,
        max_depth: 8.0,
      },
    }
  }

  async fn settle(decoder: &DepthImageDecoder) {
    tokio::time::timeout(Duration::from_secs(5), async {
      while decoder.slot.lock().in_flight {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .unwrap();
  }

  #[test]
  fn decodes_png_payload() {
    let image = decode_png_base64(&png_base64(4, 3)).unwrap();
    assert_eq!(image.dimensions(), (4, 3));
    assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
  }

  #[test]
  fn rejects_garbage() {
    assert!(matches!(decode_png_base64("%%%"), Err(DecodeError::Base64(_))));
    let not_png = STANDARD.encode(b"hello");
    assert!(matches!(decode_png_base64(&not_png), Err(DecodeError::Image(_))));
  }

  #[tokio::test]
  async fn successful_decode_becomes_current() {
    let decoder = DepthImageDecoder::new();
    assert!(decoder.current().is_none());
    decoder.submit(frame(&png_base64(8, 6)));
    settle(&decoder).await;
    let asset = decoder.current().unwrap();
    assert_eq!(asset.image.dimensions(), (8, 6));
    assert_eq!(asset.stats.max_depth, 8.0);
  }

  #[tokio::test]
  async fn failed_decode_keeps_previous_asset() {
    let decoder = DepthImageDecoder::new();
    decoder.submit(frame(&png_base64(2, 2)));
    settle(&decoder).await;
    decoder.submit(frame("not an image"));
    settle(&decoder).await;
    assert_eq!(decoder.current().unwrap().image.dimensions(), (2, 2));
  }

  #[tokio::test]
  async fn interim_frames_are_coalesced() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let counter = calls.clone();
    let order = seen.clone();
    let decoder = DepthImageDecoder::with_decoder(Arc::new(move |raster: &str| {
      counter.fetch_add(1, Ordering::SeqCst);
      order.lock().push(raster.to_string());
      std::thread::sleep(Duration::from_millis(20));
      Ok(RgbaImage::new(1, 1))
    }));

    // 第一帧开始解码前，后两帧只保留最后一帧
    decoder.submit(frame("first"));
    decoder.submit(frame("second"));
    decoder.submit(frame("third"));
    settle(&decoder).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock(), vec!["first", "third"]);
  }
  #[tokio::test]
  async fn each_camera_decoder_keeps_its_own_asset() {
    let slow = DepthImageDecoder::with_decoder(Arc::new(|_: &str| {
      std::thread::sleep(Duration::from_millis(100));
      Ok(RgbaImage::new(3, 3))
    }));
    slow.submit(frame("lobby"));

    // 切换摄像头时换用新的解码器，旧解码器的结果不会出现在新解码器中
    let fresh = DepthImageDecoder::new();
    let reader = fresh.reader();
    settle(&slow).await;
    assert!(slow.current().is_some());
    assert!(fresh.current().is_none());
    assert!(reader.latest().data.is_none());
  }
}
