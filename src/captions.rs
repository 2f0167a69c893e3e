// 该文件是 Shanan （山南西风） 项目的一部分。
// src/captions.rs - 实时字幕缓冲
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

use std::collections::HashMap;
use std::iter;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::model::stream::StreamMessage;
use crate::model::{CameraId, Caption};
use crate::stream::{Channel, StreamError, StreamHub, Subscription};

pub const DEFAULT_CAPTION_CAPACITY: usize = 10;

/// 每个摄像头最近的字幕，新的在前，不去重
///
/// 每次写入替换整个切片，读取方拿到的快照不会再变化。
#[derive(Debug)]
pub struct CaptionBuffer {
  capacity: usize,
  cameras: RwLock<HashMap<CameraId, Arc<[Caption]>>>,
}

impl Default for CaptionBuffer {
  fn default() -> Self {
    Self::with_capacity(DEFAULT_CAPTION_CAPACITY)
  }
}

impl CaptionBuffer {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      cameras: RwLock::new(HashMap::new()),
    }
  }

  pub fn push(&self, caption: Caption) {
    let mut cameras = self.cameras.write();
    let previous = cameras.get(&caption.camera_id).cloned();
    let camera_id = caption.camera_id.clone();
    let next: Arc<[Caption]> = iter::once(caption)
      .chain(previous.iter().flat_map(|captions| captions.iter().cloned()))
      .take(self.capacity)
      .collect();
    cameras.insert(camera_id, next);
  }

  pub fn snapshot(&self, camera_id: &CameraId) -> Arc<[Caption]> {
    self
      .cameras
      .read()
      .get(camera_id)
      .cloned()
      .unwrap_or_else(|| Arc::from(Vec::new()))
  }

  pub fn clear(&self, camera_id: &CameraId) {
    self.cameras.write().remove(camera_id);
  }
}

/// 订阅一个摄像头的字幕通道并写入共享缓冲
pub struct CaptionFeed {
  camera_id: CameraId,
  buffer: Arc<CaptionBuffer>,
  _subscription: Subscription,
}

impl CaptionFeed {
  pub fn start(
    hub: &StreamHub,
    camera_id: CameraId,
    buffer: Arc<CaptionBuffer>,
  ) -> Result<Self, StreamError> {
    let channel_camera = camera_id.clone();
    let sink = buffer.clone();
    let subscription = hub.subscribe(Channel::Captions(camera_id.clone()), move |message| {
      if let StreamMessage::Caption(caption) = message {
        let caption = caption.clone().into_caption(&channel_camera);
        debug!("{}: 字幕 {}", caption.camera_id, caption.text);
        sink.push(caption);
      }
    })?;
    Ok(Self {
      camera_id,
      buffer,
      _subscription: subscription,
    })
  }

  pub fn camera_id(&self) -> &CameraId {
    &self.camera_id
  }

  pub fn snapshot(&self) -> Arc<[Caption]> {
    self.buffer.snapshot(&self.camera_id)
  }
}
