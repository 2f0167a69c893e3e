// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stream/client.rs - 自动重连的事件通道客户端
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
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use super::{Connection, ConnectionState, Connector};
use crate::model::stream::StreamMessage;

pub type MessageCallback = Arc<dyn Fn(&StreamMessage) + Send + Sync>;

const PING_TEXT: &str = "ping";

#[derive(Debug, Clone)]
pub struct StreamOptions {
  /// 首次重连等待时间
  pub reconnect_delay: Duration,
  /// 连续失败时等待时间翻倍的上限；与 `reconnect_delay` 相同即固定间隔
  pub max_reconnect_delay: Duration,
  pub ping_interval: Duration,
}

impl Default for StreamOptions {
  fn default() -> Self {
    Self {
      reconnect_delay: Duration::from_secs(3),
      max_reconnect_delay: Duration::from_secs(3),
      ping_interval: Duration::from_secs(30),
    }
  }
}

/// 订阅句柄，销毁时取消订阅
pub struct Subscription {
  release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
  pub(crate) fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
    Self {
      release: Some(Box::new(release)),
    }
  }

  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(release) = self.release.take() {
      release();
    }
  }
}

type Subscribers = Mutex<BTreeMap<u64, MessageCallback>>;

// 后台任务持有的部分，不引用客户端本身
#[derive(Clone)]
struct Link {
  endpoint: Url,
  connector: Arc<dyn Connector>,
  options: StreamOptions,
  subscribers: Arc<Subscribers>,
  state: Arc<watch::Sender<ConnectionState>>,
  /// `close()` 每次加一；旧任务的状态更新被忽略
  live: Arc<AtomicU64>,
  generation: u64,
}

struct Shared {
  link: Link,
  next_id: AtomicU64,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
  fn drop(&mut self) {
    if let Some(task) = self.task.get_mut().take() {
      task.abort();
    }
  }
}

/// 单个通道的客户端
///
/// 克隆得到的句柄共享同一条连接。后台只有一个任务负责连接、收发和重连，
/// 因此任何时候最多只有一个重连计时。
#[derive(Clone)]
pub struct EventStreamClient {
  shared: Arc<Shared>,
}

impl EventStreamClient {
  pub fn new(endpoint: Url, connector: Arc<dyn Connector>, options: StreamOptions) -> Self {
    let (state, _) = watch::channel(ConnectionState::Disconnected);
    Self {
      shared: Arc::new(Shared {
        link: Link {
          endpoint,
          connector,
          options,
          subscribers: Arc::new(Mutex::new(BTreeMap::new())),
          state: Arc::new(state),
          live: Arc::new(AtomicU64::new(0)),
          generation: 0,
        },
        next_id: AtomicU64::new(0),
        task: Mutex::new(None),
      }),
    }
  }

  pub fn endpoint(&self) -> &Url {
    &self.shared.link.endpoint
  }

  /// 开始连接；正在连接、已连接或等待重连时不做任何事
  pub fn connect(&self) {
    let mut task = self.shared.task.lock();
    if task.as_ref().is_some_and(|task| !task.is_finished()) {
      debug!("{}: 已在运行，忽略重复连接", self.endpoint());
      return;
    }
    *task = Some(tokio::spawn(self.task_link().run()));
  }

  fn task_link(&self) -> Link {
    let link = &self.shared.link;
    Link {
      generation: link.live.load(Ordering::SeqCst),
      ..link.clone()
    }
  }

  /// 关闭连接并取消待定的重连
  pub fn close(&self) {
    // 先作废再写状态，仍在其他线程上运行的旧任务无法覆盖 Disconnected
    self.shared.link.live.fetch_add(1, Ordering::SeqCst);
    if let Some(task) = self.shared.task.lock().take() {
      task.abort();
      info!("{}: 通道关闭", self.endpoint());
    }
    self
      .shared
      .link
      .state
      .send_replace(ConnectionState::Disconnected);
  }

  pub fn subscribe(&self, callback: impl Fn(&StreamMessage) + Send + Sync + 'static) -> Subscription {
    let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
    self
      .shared
      .link
      .subscribers
      .lock()
      .insert(id, Arc::new(callback));
    let subscribers: Weak<Subscribers> = Arc::downgrade(&self.shared.link.subscribers);
    Subscription::new(move || {
      if let Some(subscribers) = subscribers.upgrade() {
        subscribers.lock().remove(&id);
      }
    })
  }

  pub fn subscriber_count(&self) -> usize {
    self.shared.link.subscribers.lock().len()
  }

  pub fn state(&self) -> ConnectionState {
    *self.shared.link.state.borrow()
  }

  pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
    self.shared.link.state.subscribe()
  }
}

impl Link {
  fn set_state(&self, state: ConnectionState) {
    self.state.send_if_modified(|current| {
      if self.live.load(Ordering::SeqCst) != self.generation {
        return false;
      }
      *current = state;
      true
    });
  }

  async fn run(self) {
    let mut delay = self.options.reconnect_delay;
    loop {
      self.set_state(ConnectionState::Connecting);
      let failed = match self.connector.connect(&self.endpoint).await {
        Ok(connection) => {
          info!("{}: 已连接", self.endpoint);
          delay = self.options.reconnect_delay;
          self.set_state(ConnectionState::Connected);
          self.pump(connection).await;
          false
        }
        Err(err) => {
          warn!("{}: 连接失败: {}", self.endpoint, err);
          true
        }
      };

      self.set_state(ConnectionState::Disconnected);
      info!("{}: {:?} 后重连", self.endpoint, delay);
      tokio::time::sleep(delay).await;
      if failed {
        delay = (delay * 2).min(self.options.max_reconnect_delay.max(self.options.reconnect_delay));
      }
    }
  }

  async fn pump(&self, connection: Connection) {
    let Connection {
      mut incoming,
      mut outgoing,
    } = connection;
    let period = self.options.ping_interval;
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        message = incoming.next() => match message {
          Some(Ok(text)) => self.dispatch(&text),
          Some(Err(err)) => {
            warn!("{}: 连接错误: {}", self.endpoint, err);
            return;
          }
          None => {
            warn!("{}: 服务端关闭连接", self.endpoint);
            return;
          }
        },
        _ = ping.tick() => {
          if let Err(err) = outgoing.send(PING_TEXT.to_string()).await {
            warn!("{}: 发送心跳失败: {}", self.endpoint, err);
            return;
          }
        }
      }
    }
  }

  fn dispatch(&self, text: &str) {
    let message = match StreamMessage::parse(text) {
      Ok(message) => message,
      Err(err) => {
        warn!("{}: 丢弃无法解析的消息: {}", self.endpoint, err);
        return;
      }
    };

    // 复制订阅者列表后再回调，回调中可以安全地订阅或取消订阅
    let subscribers: Vec<MessageCallback> = self.subscribers.lock().values().cloned().collect();
    for callback in subscribers {
      if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
        warn!("{}: 订阅者处理消息时 panic", self.endpoint);
      }
    }
  }
}
