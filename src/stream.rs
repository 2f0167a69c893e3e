// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stream.rs - 事件推送通道
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

use std::fmt;
use std::pin::Pin;

use futures_util::Sink;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use thiserror::Error;
use url::Url;

pub(crate) mod client;
mod hub;
#[cfg(feature = "websocket_stream")]
mod websocket;

pub use self::client::{EventStreamClient, MessageCallback, StreamOptions, Subscription};
pub use self::hub::{Channel, StreamHub};
#[cfg(feature = "websocket_stream")]
pub use self::websocket::WebSocketConnector;

#[derive(Error, Debug)]
pub enum StreamError {
  #[cfg(feature = "websocket_stream")]
  #[error("WebSocket 错误: {0}")]
  WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
  #[error("URL 错误: {0}")]
  Url(#[from] url::ParseError),
  #[error("不支持的通道地址: {0}")]
  UnsupportedEndpoint(String),
  #[error("连接已关闭")]
  Closed,
}

/// 通道连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
  #[default]
  Disconnected,
  Connecting,
  Connected,
}

impl ConnectionState {
  /// 界面上的连接状态徽标
  pub fn badge(&self) -> &'static str {
    match self {
      ConnectionState::Connected => "Live",
      ConnectionState::Connecting => "Connecting",
      ConnectionState::Disconnected => "Offline",
    }
  }
}

impl fmt::Display for ConnectionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.badge())
  }
}

/// 一条已建立的文本消息连接
pub struct Connection {
  /// 服务端关闭连接时结束
  pub incoming: BoxStream<'static, Result<String, StreamError>>,
  pub outgoing: Pin<Box<dyn Sink<String, Error = StreamError> + Send>>,
}

/// 建立连接的方式，测试中可替换为脚本化的实现
pub trait Connector: Send + Sync + 'static {
  fn connect(&self, endpoint: &Url) -> BoxFuture<'static, Result<Connection, StreamError>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn badges_follow_state() {
    assert_eq!(ConnectionState::default().badge(), "Offline");
    assert_eq!(ConnectionState::Connecting.badge(), "Connecting");
    assert_eq!(ConnectionState::Connected.to_string(), "Live");
  }
}
