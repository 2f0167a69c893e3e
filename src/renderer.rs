// 该文件是 Shanan （山南西风） 项目的一部分。
// src/renderer.rs - 叠加层渲染循环
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

//! 叠加层渲染。
//!
//! 每种叠加层一个渲染循环：每个动画周期读取最新快照与几何信息，
//! 清空画布后先画全部边框再画全部标签，最后交给输出端。
//! 轮询频率与绘制频率互不相关。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use image::RgbaImage;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::geometry::{CoordinateMapper, FrameGeometryProvider};
use crate::output::{OutputError, SurfaceSink};
use crate::snapshot::SnapshotReader;

pub mod canvas;
pub mod painters;

pub use self::canvas::Canvas;
pub use self::painters::{ChairPainter, DepthPainter, ObjectPainter, PersonPainter};

/// 叠加层种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum OverlayKind {
  Objects,
  Persons,
  Chairs,
  Depth,
}

impl OverlayKind {
  /// 自下而上的叠放顺序
  pub const ALL: [OverlayKind; 4] = [
    OverlayKind::Depth,
    OverlayKind::Objects,
    OverlayKind::Chairs,
    OverlayKind::Persons,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      OverlayKind::Objects => "objects",
      OverlayKind::Persons => "persons",
      OverlayKind::Chairs => "chairs",
      OverlayKind::Depth => "depth",
    }
  }
}

impl fmt::Display for OverlayKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 某一种叠加层的绘制方式
pub trait OverlayPainter: Send + 'static {
  type Data: Send + Sync + 'static;

  fn kind(&self) -> OverlayKind;

  /// 边框等主体部分
  fn paint_bodies(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data);

  /// 标签与徽标，总是绘制在所有主体之上
  fn paint_labels(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
  Disabled,
  Rendering,
}

/// 单帧绘制：画布、绘制方式与数据来源
pub struct FrameRenderer<P: OverlayPainter> {
  painter: P,
  canvas: Canvas,
  geometry: Arc<dyn FrameGeometryProvider>,
  source: SnapshotReader<P::Data>,
}

impl<P: OverlayPainter> FrameRenderer<P> {
  pub fn new(
    painter: P,
    canvas: Canvas,
    geometry: Arc<dyn FrameGeometryProvider>,
    source: SnapshotReader<P::Data>,
  ) -> Self {
    Self {
      painter,
      canvas,
      geometry,
      source,
    }
  }

  /// 绘制一帧并返回画布内容
  pub fn render(&mut self) -> &RgbaImage {
    // 几何信息每帧重新读取，窗口缩放后下一帧即生效
    let geometry = self.geometry.geometry();
    let mapper = CoordinateMapper::new(&geometry);
    self
      .canvas
      .prepare(geometry.display_width, geometry.display_height);

    let snapshot = self.source.latest();
    self
      .painter
      .paint_bodies(&mut self.canvas, &mapper, &snapshot.data);
    self
      .painter
      .paint_labels(&mut self.canvas, &mapper, &snapshot.data);
    self.canvas.image()
  }
}

/// 渲染循环的类型擦除控制接口
pub trait RenderControl: Send + Sync {
  fn kind(&self) -> OverlayKind;
  fn enable(&self);
  fn disable(&self);
  fn state(&self) -> RendererState;
}

/// 以动画周期持续重绘的叠加层
pub struct OverlayRenderer<P: OverlayPainter> {
  kind: OverlayKind,
  frame: Arc<Mutex<FrameRenderer<P>>>,
  sink: Arc<dyn SurfaceSink>,
  tick: Duration,
  task: Mutex<Option<JoinHandle<()>>>,
  /// 每次关闭加一，循环在绘制锁内比对
  generation: Arc<AtomicU64>,
}

impl<P: OverlayPainter> OverlayRenderer<P> {
  pub fn new(frame: FrameRenderer<P>, sink: Arc<dyn SurfaceSink>, tick: Duration) -> Self {
    Self {
      kind: frame.painter.kind(),
      frame: Arc::new(Mutex::new(frame)),
      sink,
      tick,
      task: Mutex::new(None),
      generation: Arc::new(AtomicU64::new(0)),
    }
  }

  /// 同步绘制并输出一帧
  pub fn render_frame(&self) -> Result<(), OutputError> {
    present(&mut self.frame.lock(), self.sink.as_ref(), self.kind)
  }

  /// 启动渲染循环；已在运行时不做任何事
  pub fn enable(&self) {
    let mut task = self.task.lock();
    if task.as_ref().is_some_and(|task| !task.is_finished()) {
      return;
    }

    let kind = self.kind;
    let frame = self.frame.clone();
    let sink = self.sink.clone();
    let tick = self.tick;
    let live = self.generation.clone();
    let generation = live.load(Ordering::SeqCst);
    info!("{}: 开始渲染，周期 {:?}", kind, tick);
    *task = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(tick);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        ticker.tick().await;
        let mut guard = frame.lock();
        if live.load(Ordering::SeqCst) != generation {
          break;
        }
        if let Err(err) = present(&mut guard, sink.as_ref(), kind) {
          warn!("{}: 输出失败: {}", kind, err);
        }
      }
    }));
  }

  /// 停止渲染循环并撤下画面
  pub fn disable(&self) {
    if let Some(task) = self.task.lock().take() {
      self.generation.fetch_add(1, Ordering::SeqCst);
      task.abort();
      // abort 打断不了正在进行的输出，等它结束再撤下画面
      drop(self.frame.lock());
      self.sink.withdraw(self.kind);
      info!("{}: 停止渲染", self.kind);
    }
  }

  pub fn state(&self) -> RendererState {
    match self.task.lock().as_ref() {
      Some(task) if !task.is_finished() => RendererState::Rendering,
      _ => RendererState::Disabled,
    }
  }
}

impl<P: OverlayPainter> RenderControl for OverlayRenderer<P> {
  fn kind(&self) -> OverlayKind {
    self.kind
  }

  fn enable(&self) {
    OverlayRenderer::enable(self)
  }

  fn disable(&self) {
    OverlayRenderer::disable(self)
  }

  fn state(&self) -> RendererState {
    OverlayRenderer::state(self)
  }
}

impl<P: OverlayPainter> Drop for OverlayRenderer<P> {
  fn drop(&mut self) {
    self.disable();
  }
}

fn present<P: OverlayPainter>(
  frame: &mut FrameRenderer<P>,
  sink: &dyn SurfaceSink,
  kind: OverlayKind,
) -> Result<(), OutputError> {
  let surface = frame.render();
  debug!("{}: 输出 {}x{}", kind, surface.width(), surface.height());
  sink.present(kind, surface)
}
