// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 叠加层配置
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

//! 配置以后端 API 地址给出，查询参数覆盖默认值，例如
//! `http://host:8000/api/v1?poll_ms=250&opacity=0.5&font=/usr/share/fonts/DejaVuSans.ttf`。

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::alerts::DEFAULT_ALERT_CAPACITY;
use crate::captions::DEFAULT_CAPTION_CAPACITY;
use crate::stream::StreamOptions;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_DEPTH_OPACITY: f32 = 0.6;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("不支持的地址方案: {0}")]
  UnsupportedScheme(String),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("未知参数: {0}")]
  UnknownKey(String),
  #[error("URL 错误: {0}")]
  Url(#[from] url::ParseError),
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
  /// 遥测接口前缀，不含查询参数
  pub api_base: Url,
  /// 推送通道前缀
  pub ws_base: Url,
  pub poll_interval: Duration,
  pub fetch_timeout: Duration,
  pub frame_interval: Duration,
  pub stream: StreamOptions,
  pub alert_capacity: usize,
  pub caption_capacity: usize,
  pub depth_opacity: f32,
  pub font: Option<PathBuf>,
}

impl OverlayConfig {
  /// 全部使用默认值
  pub fn new(api_base: Url) -> Result<Self, ConfigError> {
    let ws_base = derive_ws_base(&api_base)?;
    Ok(Self {
      api_base,
      ws_base,
      poll_interval: DEFAULT_POLL_INTERVAL,
      fetch_timeout: DEFAULT_POLL_INTERVAL,
      frame_interval: DEFAULT_FRAME_INTERVAL,
      stream: StreamOptions::default(),
      alert_capacity: DEFAULT_ALERT_CAPACITY,
      caption_capacity: DEFAULT_CAPTION_CAPACITY,
      depth_opacity: DEFAULT_DEPTH_OPACITY,
      font: None,
    })
  }
}

impl FromUrl for OverlayConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut api_base = url.clone();
    api_base.set_query(None);
    api_base.set_fragment(None);
    let mut config = OverlayConfig::new(api_base)?;

    let mut timeout = None;
    let mut max_reconnect = None;
    for (k, v) in url.query_pairs() {
      match &*k {
        "poll_ms" => config.poll_interval = millis(&k, &v)?,
        "timeout_ms" => timeout = Some(millis(&k, &v)?),
        "frame_ms" => config.frame_interval = millis(&k, &v)?,
        "reconnect_ms" => config.stream.reconnect_delay = millis(&k, &v)?,
        "max_reconnect_ms" => max_reconnect = Some(millis(&k, &v)?),
        "ping_ms" => config.stream.ping_interval = millis(&k, &v)?,
        "opacity" => {
          let opacity: f32 = parse(&k, &v)?;
          if !(0.0..=1.0).contains(&opacity) {
            return Err(invalid(&k, &v));
          }
          config.depth_opacity = opacity;
        }
        "font" => config.font = Some(PathBuf::from(v.into_owned())),
        "ws" => config.ws_base = Url::parse(&v)?,
        _ => return Err(ConfigError::UnknownKey(k.into_owned())),
      }
    }

    // 未显式给出时跟随轮询间隔与重连间隔
    config.fetch_timeout = timeout.unwrap_or(config.poll_interval);
    config.stream.max_reconnect_delay = max_reconnect
      .unwrap_or(config.stream.reconnect_delay)
      .max(config.stream.reconnect_delay);

    Ok(config)
  }
}

fn derive_ws_base(api_base: &Url) -> Result<Url, ConfigError> {
  let scheme = match api_base.scheme() {
    "http" | "ws" => "ws",
    "https" | "wss" => "wss",
    other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
  };
  let mut ws_base = api_base.clone();
  ws_base
    .set_scheme(scheme)
    .map_err(|_| ConfigError::UnsupportedScheme(api_base.scheme().to_string()))?;
  Ok(ws_base)
}

fn invalid(key: &str, value: &str) -> ConfigError {
  ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| invalid(key, value))
}

fn millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
  match parse::<u64>(key, value)? {
    0 => Err(invalid(key, value)),
    ms => Ok(Duration::from_millis(ms)),
  }
}
