// 该文件是 Shanan （山南西风） 项目的一部分。
// src/telemetry.rs - 遥测数据源
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

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::model::{CameraId, ChairState, DepthFrame, Detection, TrackedPerson};

#[cfg(feature = "http_telemetry")]
mod http_client;
#[cfg(feature = "http_telemetry")]
pub use self::http_client::HttpTelemetryClient;

#[derive(Error, Debug)]
pub enum TelemetryError {
  #[cfg(feature = "http_telemetry")]
  #[error("HTTP 请求错误: {0}")]
  Http(#[from] reqwest::Error),
  #[error("响应解析错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("URL 错误: {0}")]
  Url(#[from] url::ParseError),
  #[error("服务端返回失败: {0}")]
  Unsuccessful(String),
  #[error("响应缺少字段: {0}")]
  MissingField(&'static str),
}

/// 每种叠加层的遥测来源
///
/// 返回的 future 不借用 `self`，可直接交给轮询器在后台执行。
pub trait TelemetrySource: Send + Sync + 'static {
  fn detections(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<Detection>, TelemetryError>>;

  fn persons(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<TrackedPerson>, TelemetryError>>;

  fn chairs(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<ChairState>, TelemetryError>>;

  fn depth(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<DepthFrame, TelemetryError>>;
}

/// `success:false` 与网络错误同等对待：本轮不更新
pub(crate) fn check_envelope<E: crate::model::telemetry::Envelope>(response: &E) -> Result<(), TelemetryError> {
  if response.success() {
    Ok(())
  } else {
    Err(TelemetryError::Unsuccessful(
      response.error().unwrap_or("unknown error").to_string(),
    ))
  }
}
