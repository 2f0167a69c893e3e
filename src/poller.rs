// 该文件是 Shanan （山南西风） 项目的一部分。
// src/poller.rs - 遥测轮询调度
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

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::model::CameraId;

/// 一次成功轮询的结果
#[derive(Debug, Clone)]
pub struct Polled<T> {
  /// 发出请求时分配，单调递增
  pub ticket: u64,
  pub camera_id: CameraId,
  pub value: T,
}

/// 固定间隔的遥测轮询器
///
/// 每次 `start` 只有一个定时任务；每个周期内最多一个请求在途，
/// 请求超时上限默认为一个周期。
pub struct TelemetryPoller {
  name: &'static str,
  fetch_timeout: Option<Duration>,
  tickets: Arc<AtomicU64>,
  // 当前有效的代号；投递结果时持锁检查
  active: Arc<Mutex<u64>>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryPoller {
  pub fn new(name: &'static str) -> Self {
    Self {
      name,
      fetch_timeout: None,
      tickets: Arc::new(AtomicU64::new(0)),
      active: Arc::new(Mutex::new(0)),
      task: Mutex::new(None),
    }
  }

  /// 覆盖请求超时，默认与轮询间隔相同
  pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
    self.fetch_timeout = Some(timeout);
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn is_active(&self) -> bool {
    self
      .task
      .lock()
      .as_ref()
      .map(|task| !task.is_finished())
      .unwrap_or(false)
  }

  /// 开始轮询；若已在运行则先停止旧的定时器
  ///
  /// `on_result` 在投递锁内执行，不能在其中调用本轮询器的 `stop`/`start`。
  pub fn start<T, E, F, Fut, R>(&self, camera_id: CameraId, interval: Duration, fetch: F, on_result: R)
  where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(CameraId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    R: Fn(Polled<T>) + Send + Sync + 'static,
  {
    let mut task = self.task.lock();
    let generation = {
      let mut active = self.active.lock();
      *active += 1;
      *active
    };
    if let Some(previous) = task.take() {
      previous.abort();
      debug!("{}: 重新启动，取消旧定时器", self.name);
    }

    let name = self.name;
    let timeout = self.fetch_timeout.unwrap_or(interval);
    let tickets = self.tickets.clone();
    let active = self.active.clone();
    info!("{}: 开始轮询摄像头 {}，间隔 {:?}", name, camera_id, interval);

    *task = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        ticker.tick().await;
        let ticket = tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let request = AssertUnwindSafe(fetch(camera_id.clone())).catch_unwind();
        let outcome = tokio::time::timeout(timeout, request).await;

        let guard = active.lock();
        if *guard != generation {
          debug!("{}: 轮询已停止，丢弃迟到的结果 #{}", name, ticket);
          return;
        }
        match outcome {
          Ok(Ok(Ok(value))) => on_result(Polled {
            ticket,
            camera_id: camera_id.clone(),
            value,
          }),
          Ok(Ok(Err(err))) => warn!("{}: 摄像头 {} 获取失败: {}", name, camera_id, err),
          Ok(Err(_)) => warn!("{}: 摄像头 {} 获取过程 panic", name, camera_id),
          Err(_) => warn!("{}: 摄像头 {} 获取超时 ({:?})", name, camera_id, timeout),
        }
        drop(guard);
      }
    }));
  }

  /// 停止轮询；返回后不会再有 `on_result` 被调用
  pub fn stop(&self) {
    let mut task = self.task.lock();
    *self.active.lock() += 1;
    if let Some(task) = task.take() {
      task.abort();
      info!("{}: 停止轮询", self.name);
    }
  }
}

impl Drop for TelemetryPoller {
  fn drop(&mut self) {
    self.stop();
  }
}
