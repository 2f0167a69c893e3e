// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/event_listen.rs - 监听告警与字幕推送
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shanan_overlay::{
  FromUrl,
  alerts::AlertFeed,
  captions::{CaptionBuffer, CaptionFeed},
  config::OverlayConfig,
  model::{Alert, CameraId},
  stream::{StreamHub, WebSocketConnector},
};

/// 事件监听参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端 API 地址，查询参数覆盖默认配置
  #[arg(long, value_name = "API")]
  pub api: Url,
  /// 同时监听这些摄像头的字幕
  #[arg(long, value_name = "CAMERA", value_delimiter = ',')]
  pub camera: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let config = OverlayConfig::from_url(&args.api)?;
  info!("推送地址: {}", config.ws_base);

  let hub = StreamHub::new(
    config.ws_base.clone(),
    Arc::new(WebSocketConnector),
    config.stream.clone(),
  );
  let alerts = AlertFeed::start(
    &hub,
    config.alert_capacity,
    Some(Arc::new(|alert: &Alert| {
      warn!(
        "告警 [{}] {}: {}",
        alert.severity, alert.rule_name, alert.caption
      );
    })),
  )?;

  let buffer = Arc::new(CaptionBuffer::with_capacity(config.caption_capacity));
  let mut feeds = Vec::with_capacity(args.camera.len());
  for camera in &args.camera {
    feeds.push(CaptionFeed::start(
      &hub,
      CameraId::new(camera.clone()),
      buffer.clone(),
    )?);
  }

  let mut reader = alerts.reader();
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;

  loop {
    tokio::select! {
      snapshot = reader.changed() => match snapshot {
        Some(snapshot) => info!("当前告警 {} 条", snapshot.data.len()),
        None => break,
      },
      _ = rx.recv() => break,
    }
  }

  for feed in &feeds {
    for caption in feed.snapshot().iter() {
      info!("{} [{:.2}] {}", feed.camera_id(), caption.confidence, caption.text);
    }
  }
  Ok(())
}
