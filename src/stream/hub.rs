// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stream/hub.rs - 按通道共享的客户端
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
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use url::Url;

use super::{Connector, EventStreamClient, StreamError, StreamOptions, Subscription};
use crate::model::CameraId;
use crate::model::stream::StreamMessage;

/// 逻辑通道
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
  Alerts,
  Captions(CameraId),
}

impl Channel {
  /// `ws_base` 形如 `ws://host:8000/api/v1`
  pub fn endpoint(&self, ws_base: &Url) -> Result<Url, StreamError> {
    let mut base = ws_base.clone();
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }
    let path = match self {
      Channel::Alerts => "ws/alerts".to_string(),
      Channel::Captions(camera_id) => {
        format!("ws/camera/{}/captions", urlencoding::encode(camera_id.as_str()))
      }
    };
    Ok(base.join(&path)?)
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Channel::Alerts => f.write_str("alerts"),
      Channel::Captions(camera_id) => write!(f, "captions/{camera_id}"),
    }
  }
}

struct HubInner {
  ws_base: Url,
  connector: Arc<dyn Connector>,
  options: StreamOptions,
  clients: Mutex<HashMap<Channel, EventStreamClient>>,
}

impl HubInner {
  fn release(&self, channel: &Channel) {
    let mut clients = self.clients.lock();
    if let Some(client) = clients.get(channel)
      && client.subscriber_count() == 0
    {
      client.close();
      clients.remove(channel);
      info!("{}: 最后一个订阅者已退出，释放通道", channel);
    }
  }
}

/// 每个逻辑通道一个共享客户端，首个订阅时建立，最后一个订阅退出时关闭
#[derive(Clone)]
pub struct StreamHub {
  inner: Arc<HubInner>,
}

impl StreamHub {
  pub fn new(ws_base: Url, connector: Arc<dyn Connector>, options: StreamOptions) -> Self {
    Self {
      inner: Arc::new(HubInner {
        ws_base,
        connector,
        options,
        clients: Mutex::new(HashMap::new()),
      }),
    }
  }

  pub fn subscribe(
    &self,
    channel: Channel,
    callback: impl Fn(&StreamMessage) + Send + Sync + 'static,
  ) -> Result<Subscription, StreamError> {
    let mut clients = self.inner.clients.lock();
    let client = match clients.get(&channel) {
      Some(client) => client.clone(),
      None => {
        let endpoint = channel.endpoint(&self.inner.ws_base)?;
        info!("{}: 建立通道 {}", channel, endpoint);
        let client = EventStreamClient::new(
          endpoint,
          self.inner.connector.clone(),
          self.inner.options.clone(),
        );
        clients.insert(channel.clone(), client.clone());
        client
      }
    };
    let subscription = client.subscribe(callback);
    client.connect();
    drop(clients);

    let hub = Arc::downgrade(&self.inner);
    Ok(Subscription::new(move || {
      drop(subscription);
      if let Some(hub) = hub.upgrade() {
        hub.release(&channel);
      }
    }))
  }

  /// 通道当前的客户端，用于读取连接状态
  pub fn client(&self, channel: &Channel) -> Option<EventStreamClient> {
    self.inner.clients.lock().get(channel).cloned()
  }

  pub fn channel_count(&self) -> usize {
    self.inner.clients.lock().len()
  }
}
