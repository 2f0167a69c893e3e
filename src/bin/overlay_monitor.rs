// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/overlay_monitor.rs - 无界面的叠加层监视程序
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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use image::RgbaImage;
use tracing::{info, warn};
use url::Url;

use shanan_overlay::{
  FromUrl,
  alerts::AlertFeed,
  captions::{CaptionBuffer, CaptionFeed},
  config::OverlayConfig,
  geometry::PlaybackSurface,
  model::{Alert, CameraId},
  output::{OutputError, OutputWrapper, SurfaceSink},
  renderer::canvas::load_font,
  session::{LiveOverlay, OverlayKind},
  stream::{Channel, StreamHub, WebSocketConnector},
  telemetry::HttpTelemetryClient,
};

/// 叠加层监视参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端 API 地址，查询参数覆盖默认配置
  #[arg(long, value_name = "API")]
  pub api: Url,
  /// 摄像头 ID
  #[arg(long, value_name = "CAMERA")]
  pub camera: String,
  /// 开启的叠加层
  #[arg(long, value_enum, value_delimiter = ',', default_value = "objects")]
  pub overlay: Vec<OverlayKind>,
  /// 输出路径（folder:// 或 image://）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 视频原生分辨率
  #[arg(long, default_value_t = 1920)]
  pub native_width: u32,
  #[arg(long, default_value_t = 1080)]
  pub native_height: u32,
  /// 显示区域尺寸
  #[arg(long, default_value_t = 1280)]
  pub display_width: u32,
  #[arg(long, default_value_t = 720)]
  pub display_height: u32,

  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
}

/// 统计输出帧数
struct CountingSink {
  inner: OutputWrapper,
  presented: AtomicUsize,
}

impl SurfaceSink for CountingSink {
  fn present(&self, kind: OverlayKind, surface: &RgbaImage) -> Result<(), OutputError> {
    self.inner.present(kind, surface)?;
    self.presented.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn withdraw(&self, kind: OverlayKind) {
    self.inner.withdraw(kind);
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后端地址: {}", args.api);
  info!("摄像头: {}", args.camera);
  info!("输出路径: {}", args.output);

  let config = OverlayConfig::from_url(&args.api)?;
  let camera_id = CameraId::new(args.camera.clone());
  let client = Arc::new(HttpTelemetryClient::new(&config.api_base, config.fetch_timeout)?);
  match client.stream_info(&camera_id).await {
    Ok(info) => info!("视频流: {}", info.playable_url()),
    Err(err) => warn!("无法获取视频流信息: {}", err),
  }

  let font = match &config.font {
    Some(path) => match load_font(path) {
      Ok(font) => Some(font),
      Err(err) => {
        warn!("字体加载失败，标签将不显示文字: {}", err);
        None
      }
    },
    None => None,
  };

  let surface = Arc::new(PlaybackSurface::new());
  surface.set_native_resolution(args.native_width, args.native_height);
  surface.set_display_rect(args.display_width, args.display_height);

  let sink = Arc::new(CountingSink {
    inner: OutputWrapper::from_url(&args.output)?,
    presented: AtomicUsize::new(0),
  });

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
        "新告警 [{}] {} @ {}",
        alert.severity,
        alert.rule_name,
        alert
          .camera_id
          .as_ref()
          .map(|camera| camera.to_string())
          .unwrap_or_default()
      );
    })),
  )?;
  let captions = CaptionFeed::start(
    &hub,
    camera_id.clone(),
    Arc::new(CaptionBuffer::with_capacity(config.caption_capacity)),
  )?;

  if let Some(client) = hub.client(&Channel::Alerts) {
    let mut state = client.watch_state();
    tokio::spawn(async move {
      while state.changed().await.is_ok() {
        let badge = state.borrow_and_update().badge();
        info!("告警通道: {}", badge);
      }
    });
  }

  let mut overlay = LiveOverlay::new(client, surface, sink.clone(), &config, camera_id)
    .with_font(font);
  for kind in &args.overlay {
    overlay.enable(*kind);
  }

  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;

  let mut ticker = tokio::time::interval(Duration::from_millis(100));
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let presented = sink.presented.load(Ordering::SeqCst);
        if args.frame_number > 0 && presented >= args.frame_number {
          info!("达到指定帧数 {}, 退出", presented);
          break;
        }
      }
      _ = rx.recv() => {
        warn!("中断信号接收，退出");
        break;
      }
    }
  }

  overlay.disable_all();
  for caption in captions.snapshot().iter() {
    info!("字幕 [{:.2}] {}", caption.confidence, caption.text);
  }
  info!("最近告警 {} 条", alerts.entries().len());
  Ok(())
}
