// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::path::PathBuf;

use chrono::{Datelike, Utc};
use image::RgbaImage;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::{OutputError, SurfaceSink, url_path};
use crate::renderer::OverlayKind;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 every 无效: {0}")]
  InvalidEvery(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存 PNG 帧，`every=N` 时每种叠加层每 N 帧保存一帧
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  every: u64,
  presented: Mutex<HashMap<OverlayKind, u64>>,
  frame_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut every = 1;
    for (k, v) in uri.query_pairs() {
      if k == "every" {
        every = v
          .parse::<u64>()
          .ok()
          .filter(|every| *every > 0)
          .ok_or_else(|| DirectoryRecordOutputError::InvalidEvery(v.to_string()))?;
      }
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      every,
      presented: Mutex::new(HashMap::new()),
      frame_counter: Mutex::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    let mut counter = self.frame_counter.lock();
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn should_record(&self, kind: OverlayKind) -> bool {
    let mut presented = self.presented.lock();
    let count = presented.entry(kind).or_insert(0);
    let record = *count % self.every == 0;
    *count += 1;
    record
  }

  fn frame_path(&self, kind: OverlayKind) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{}-{:04X}.png",
      now.format("%H-%M-%S"),
      kind,
      self.frame_id()
    )))
  }
}

impl SurfaceSink for DirectoryRecordOutput {
  fn present(&self, kind: OverlayKind, surface: &RgbaImage) -> Result<(), OutputError> {
    if !self.should_record(kind) {
      return Ok(());
    }
    let path = self.frame_path(kind)?;
    surface
      .save(&path)
      .map_err(DirectoryRecordOutputError::from)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}
