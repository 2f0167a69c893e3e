// 该文件是 Shanan （山南西风） 项目的一部分。
// src/session.rs - 单个摄像头的叠加层会话
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

//! 把轮询器、快照和渲染循环按叠加层种类组装起来。
//!
//! 开启一种叠加层时同时启动它的轮询与渲染，关闭时两者在同一次调用中停止。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ab_glyph::FontArc;
use futures_util::future::BoxFuture;
use tracing::info;

use crate::config::OverlayConfig;
use crate::depth::DepthImageDecoder;
use crate::geometry::FrameGeometryProvider;
use crate::model::CameraId;
use crate::output::SurfaceSink;
use crate::poller::TelemetryPoller;
use crate::renderer::{
  Canvas, ChairPainter, DepthPainter, FrameRenderer, ObjectPainter, OverlayPainter,
  OverlayRenderer, PersonPainter, RenderControl, RendererState,
};
use crate::snapshot::SnapshotStore;
use crate::telemetry::{TelemetryError, TelemetrySource};

pub use crate::renderer::OverlayKind;

struct Layer {
  poller: TelemetryPoller,
  renderer: Box<dyn RenderControl>,
}

impl Layer {
  fn teardown(&self) {
    self.poller.stop();
    self.renderer.disable();
  }
}

/// 单个摄像头上开启的全部叠加层
pub struct LiveOverlay {
  source: Arc<dyn TelemetrySource>,
  geometry: Arc<dyn FrameGeometryProvider>,
  sink: Arc<dyn SurfaceSink>,
  font: Option<FontArc>,
  poll_interval: Duration,
  fetch_timeout: Duration,
  frame_interval: Duration,
  depth_opacity: f32,
  camera_id: CameraId,
  layers: BTreeMap<OverlayKind, Layer>,
}

impl LiveOverlay {
  pub fn new(
    source: Arc<dyn TelemetrySource>,
    geometry: Arc<dyn FrameGeometryProvider>,
    sink: Arc<dyn SurfaceSink>,
    config: &OverlayConfig,
    camera_id: CameraId,
  ) -> Self {
    Self {
      source,
      geometry,
      sink,
      font: None,
      poll_interval: config.poll_interval,
      fetch_timeout: config.fetch_timeout,
      frame_interval: config.frame_interval,
      depth_opacity: config.depth_opacity,
      camera_id,
      layers: BTreeMap::new(),
    }
  }

  /// 标签字体，对之后开启的叠加层生效
  pub fn with_font(mut self, font: Option<FontArc>) -> Self {
    self.font = font;
    self
  }

  pub fn camera_id(&self) -> &CameraId {
    &self.camera_id
  }

  pub fn enabled(&self) -> Vec<OverlayKind> {
    self.layers.keys().copied().collect()
  }

  pub fn is_enabled(&self, kind: OverlayKind) -> bool {
    self.layers.contains_key(&kind)
  }

  /// 轮询是否在运行以及渲染状态
  pub fn state(&self, kind: OverlayKind) -> Option<(bool, RendererState)> {
    self
      .layers
      .get(&kind)
      .map(|layer| (layer.poller.is_active(), layer.renderer.state()))
  }

  /// 开启叠加层；已开启时不做任何事。必须在 tokio 运行时内调用
  pub fn enable(&mut self, kind: OverlayKind) {
    if self.layers.contains_key(&kind) {
      return;
    }
    info!("摄像头 {}: 开启 {}", self.camera_id, kind);
    let layer = match kind {
      OverlayKind::Objects => self.polled_layer(ObjectPainter, |source, camera_id| {
        source.detections(camera_id)
      }),
      OverlayKind::Persons => self.polled_layer(PersonPainter, |source, camera_id| {
        source.persons(camera_id)
      }),
      OverlayKind::Chairs => self.polled_layer(ChairPainter::default(), |source, camera_id| {
        source.chairs(camera_id)
      }),
      OverlayKind::Depth => self.depth_layer(),
    };
    self.layers.insert(kind, layer);
  }

  /// 关闭叠加层，轮询与渲染一起停止
  pub fn disable(&mut self, kind: OverlayKind) -> bool {
    match self.layers.remove(&kind) {
      Some(layer) => {
        layer.teardown();
        info!("摄像头 {}: 关闭 {}", self.camera_id, kind);
        true
      }
      None => false,
    }
  }

  pub fn disable_all(&mut self) {
    let kinds = self.enabled();
    for kind in kinds {
      self.disable(kind);
    }
  }

  /// 切换摄像头：全部关闭，再以空快照为新摄像头重新开启原来的叠加层
  pub fn switch_camera(&mut self, camera_id: CameraId) {
    if camera_id == self.camera_id {
      return;
    }
    let kinds = self.enabled();
    self.disable_all();
    info!("切换摄像头 {} -> {}", self.camera_id, camera_id);
    self.camera_id = camera_id;
    for kind in kinds {
      self.enable(kind);
    }
  }

  fn poller(&self, kind: OverlayKind) -> TelemetryPoller {
    TelemetryPoller::new(kind.as_str()).with_fetch_timeout(self.fetch_timeout)
  }

  fn renderer<P: OverlayPainter>(
    &self,
    painter: P,
    source: crate::snapshot::SnapshotReader<P::Data>,
  ) -> Box<dyn RenderControl> {
    let frame = FrameRenderer::new(
      painter,
      Canvas::new(self.font.clone()),
      self.geometry.clone(),
      source,
    );
    let renderer = OverlayRenderer::new(frame, self.sink.clone(), self.frame_interval);
    renderer.enable();
    Box::new(renderer)
  }

  fn polled_layer<P, F>(&self, painter: P, fetch: F) -> Layer
  where
    P: OverlayPainter,
    P::Data: Default,
    F: Fn(&dyn TelemetrySource, &CameraId) -> BoxFuture<'static, Result<P::Data, TelemetryError>>
      + Send
      + Sync
      + 'static,
  {
    let store = Arc::new(SnapshotStore::new(P::Data::default()));
    let poller = self.poller(painter.kind());
    let source = self.source.clone();
    let writer = store.clone();
    poller.start(
      self.camera_id.clone(),
      self.poll_interval,
      move |camera_id| fetch(source.as_ref(), &camera_id),
      move |polled| {
        writer.publish(polled.ticket, polled.value);
      },
    );
    let renderer = self.renderer(painter, store.reader());
    Layer { poller, renderer }
  }

  fn depth_layer(&self) -> Layer {
    let decoder = DepthImageDecoder::new();
    let poller = self.poller(OverlayKind::Depth);
    let source = self.source.clone();
    let submit = decoder.clone();
    poller.start(
      self.camera_id.clone(),
      self.poll_interval,
      move |camera_id| source.depth(&camera_id),
      move |polled| submit.submit(polled.value),
    );
    let renderer = self.renderer(DepthPainter::new(self.depth_opacity), decoder.reader());
    Layer { poller, renderer }
  }
}

impl Drop for LiveOverlay {
  fn drop(&mut self) {
    self.disable_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::{BoundingBox, FixedGeometry, NativeFrameGeometry};
  use crate::model::{ChairState, DepthFrame, Detection, TrackedPerson};
  use crate::output::OutputError;
  use futures_util::FutureExt;
  use image::RgbaImage;
  use parking_lot::Mutex;
  use url::Url;

  #[derive(Default)]
  struct FakeSource {
    requests: Mutex<Vec<(&'static str, String)>>,
  }

  impl FakeSource {
    fn record(&self, what: &'static str, camera_id: &CameraId) {
      self.requests.lock().push((what, camera_id.to_string()));
    }

    fn count(&self, what: &str) -> usize {
      self.requests.lock().iter().filter(|(kind, _)| *kind == what).count()
    }
  }

  impl TelemetrySource for FakeSource {
    fn detections(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<Detection>, TelemetryError>> {
      self.record("detections", camera_id);
      let detections = vec![Detection {
        id: 0,
        bbox: BoundingBox::new(100.0, 100.0, 300.0, 300.0),
        label: "person".to_string(),
        confidence: 0.9,
      }];
      async move { Ok(detections) }.boxed()
    }

    fn persons(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<TrackedPerson>, TelemetryError>> {
      self.record("persons", camera_id);
      async { Ok(Vec::new()) }.boxed()
    }

    fn chairs(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<ChairState>, TelemetryError>> {
      self.record("chairs", camera_id);
      async { Err(TelemetryError::Unsuccessful("Camera stream not active".to_string())) }.boxed()
    }

    fn depth(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<DepthFrame, TelemetryError>> {
      self.record("depth", camera_id);
      async { Err(TelemetryError::MissingField("depth_image")) }.boxed()
    }
  }

  #[derive(Default)]
  struct CollectingSink {
    frames: Mutex<Vec<(OverlayKind, RgbaImage)>>,
    withdrawn: Mutex<Vec<OverlayKind>>,
  }

  impl SurfaceSink for CollectingSink {
    fn present(&self, kind: OverlayKind, surface: &RgbaImage) -> Result<(), OutputError> {
      self.frames.lock().push((kind, surface.clone()));
      Ok(())
    }

    fn withdraw(&self, kind: OverlayKind) {
      self.withdrawn.lock().push(kind);
    }
  }

  fn overlay(source: Arc<FakeSource>, sink: Arc<CollectingSink>) -> LiveOverlay {
    let config = OverlayConfig::new(Url::parse("http://localhost:8000/api/v1").unwrap()).unwrap();
    let geometry = Arc::new(FixedGeometry(NativeFrameGeometry::new(1920, 1080, 960, 540)));
    LiveOverlay::new(source, geometry, sink, &config, CameraId::from("lobby"))
  }

  #[tokio::test(start_paused = true)]
  async fn enabled_overlay_polls_and_paints() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(CollectingSink::default());
    let mut overlay = overlay(source.clone(), sink.clone());

    overlay.enable(OverlayKind::Objects);
    overlay.enable(OverlayKind::Objects);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(source.count("detections"), 2);
    assert_eq!(overlay.state(OverlayKind::Objects), Some((true, RendererState::Rendering)));
    let frames = sink.frames.lock();
    let (kind, last) = frames.last().unwrap();
    assert_eq!(*kind, OverlayKind::Objects);
    assert_eq!(last.dimensions(), (960, 540));
    // [100,100,300,300] 在 50% 缩放下的左上角
    assert_eq!(last.get_pixel(50, 50)[3], 255);
  }

  #[tokio::test(start_paused = true)]
  async fn disable_stops_polling_and_painting_together() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(CollectingSink::default());
    let mut overlay = overlay(source.clone(), sink.clone());

    overlay.enable(OverlayKind::Objects);
    overlay.enable(OverlayKind::Chairs);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(overlay.disable(OverlayKind::Objects));
    assert!(!overlay.disable(OverlayKind::Objects));
    assert_eq!(overlay.enabled(), vec![OverlayKind::Chairs]);
    assert_eq!(*sink.withdrawn.lock(), vec![OverlayKind::Objects]);

    let fetched = source.count("detections");
    let painted = sink
      .frames
      .lock()
      .iter()
      .filter(|(kind, _)| *kind == OverlayKind::Objects)
      .count();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.count("detections"), fetched);
    let painted_after = sink
      .frames
      .lock()
      .iter()
      .filter(|(kind, _)| *kind == OverlayKind::Objects)
      .count();
    assert_eq!(painted_after, painted);
    // 失败的椅子请求不影响渲染循环
    assert_eq!(overlay.state(OverlayKind::Chairs), Some((true, RendererState::Rendering)));
  }

  #[tokio::test(start_paused = true)]
  async fn switching_camera_restarts_enabled_overlays() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(CollectingSink::default());
    let mut overlay = overlay(source.clone(), sink.clone());

    overlay.enable(OverlayKind::Persons);
    overlay.enable(OverlayKind::Depth);
    tokio::time::sleep(Duration::from_millis(10)).await;
    overlay.switch_camera(CameraId::from("gate"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(overlay.camera_id().as_str(), "gate");
    assert_eq!(overlay.enabled(), vec![OverlayKind::Persons, OverlayKind::Depth]);
    let requests = source.requests.lock().clone();
    assert!(requests.contains(&("persons", "gate".to_string())));
    assert!(requests.contains(&("depth", "gate".to_string())));
    assert_eq!(requests.iter().filter(|(_, camera)| camera == "lobby").count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn dropping_session_tears_everything_down() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(CollectingSink::default());
    let mut overlay = overlay(source.clone(), sink.clone());
    for kind in OverlayKind::ALL {
      overlay.enable(kind);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(overlay);

    assert_eq!(sink.withdrawn.lock().len(), 4);
    let requests = source.requests.lock().len();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.requests.lock().len(), requests);
  }
}
