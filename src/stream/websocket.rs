// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stream/websocket.rs - WebSocket 连接
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

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use super::{Connection, Connector, StreamError};

/// 基于 tokio-tungstenite 的连接方式
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
  fn connect(&self, endpoint: &Url) -> BoxFuture<'static, Result<Connection, StreamError>> {
    let endpoint = endpoint.clone();
    async move {
      if !matches!(endpoint.scheme(), "ws" | "wss") {
        return Err(StreamError::UnsupportedEndpoint(endpoint.to_string()));
      }
      let (socket, response) = connect_async(endpoint.as_str()).await?;
      debug!("{}: 握手完成 {}", endpoint, response.status());
      let (write, read) = socket.split();

      // 只关心文本帧；收到 Close 视为连接结束
      let incoming = read
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| {
          future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(text.as_str().to_string())),
            Ok(_) => None,
            Err(err) => Some(Err(StreamError::from(err))),
          })
        })
        .boxed();
      let outgoing = write
        .sink_map_err(StreamError::from)
        .with(|text: String| future::ready(Ok::<_, StreamError>(Message::text(text))));

      Ok(Connection {
        incoming,
        outgoing: Box::pin(outgoing),
      })
    }
    .boxed()
  }
}
