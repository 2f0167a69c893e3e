// 该文件是 Shanan （山南西风） 项目的一部分。
// src/telemetry/http_client.rs - HTTP 遥测客户端
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

use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{TelemetryError, TelemetrySource, check_envelope};
use crate::model::telemetry::{
  ChairTrackingResponse, DepthMapResponse, DetectionsResponse, ReidTrackResponse, StreamInfo,
};
use crate::model::{CameraId, ChairState, DepthFrame, Detection, TrackedPerson};

/// 通过后端 REST 接口获取遥测
#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
  client: reqwest::Client,
  base: Url,
}

impl HttpTelemetryClient {
  /// `base` 形如 `http://host:8000/api/v1`，`timeout` 作为单次请求的上限
  pub fn new(base: &Url, timeout: Duration) -> Result<Self, TelemetryError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base: with_trailing_slash(base),
    })
  }

  pub fn base(&self) -> &Url {
    &self.base
  }

  fn camera_endpoint(&self, camera_id: &CameraId, tail: &str) -> Result<Url, TelemetryError> {
    let path = format!("cameras/{}/{}", urlencoding::encode(camera_id.as_str()), tail);
    Ok(self.base.join(&path)?)
  }

  fn get_json<T: DeserializeOwned + Send + 'static>(
    &self,
    url: Result<Url, TelemetryError>,
  ) -> BoxFuture<'static, Result<T, TelemetryError>> {
    let client = self.client.clone();
    async move {
      let url = url?;
      debug!("GET {}", url);
      let body = client.get(url).send().await?.error_for_status()?.bytes().await?;
      Ok(serde_json::from_slice(&body)?)
    }
    .boxed()
  }

  /// 视频流信息，由播放管线使用
  pub async fn stream_info(&self, camera_id: &CameraId) -> Result<StreamInfo, TelemetryError> {
    self.get_json(self.camera_endpoint(camera_id, "stream")).await
  }
}

impl TelemetrySource for HttpTelemetryClient {
  fn detections(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<Detection>, TelemetryError>> {
    let request = self.get_json::<DetectionsResponse>(self.camera_endpoint(camera_id, "detections"));
    async move {
      let response = request.await?;
      check_envelope(&response)?;
      Ok(response.into_detections())
    }
    .boxed()
  }

  fn persons(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<TrackedPerson>, TelemetryError>> {
    let url = self.base.join("person-reid/reid/track").map(|mut url| {
      url.query_pairs_mut().append_pair("camera_ids", camera_id.as_str());
      url
    });
    let request = self.get_json::<ReidTrackResponse>(url.map_err(TelemetryError::from));
    let camera_id = camera_id.clone();
    async move {
      let response = request.await?;
      check_envelope(&response)?;
      Ok(response.into_persons(&camera_id))
    }
    .boxed()
  }

  fn chairs(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<Vec<ChairState>, TelemetryError>> {
    let request = self.get_json::<ChairTrackingResponse>(self.camera_endpoint(camera_id, "chair-tracking"));
    async move {
      let response = request.await?;
      check_envelope(&response)?;
      Ok(response.into_chairs())
    }
    .boxed()
  }

  fn depth(&self, camera_id: &CameraId) -> BoxFuture<'static, Result<DepthFrame, TelemetryError>> {
    let request = self.get_json::<DepthMapResponse>(self.camera_endpoint(camera_id, "depth-map"));
    async move {
      let response = request.await?;
      check_envelope(&response)?;
      response
        .into_frame()
        .ok_or(TelemetryError::MissingField("depth_image"))
    }
    .boxed()
  }
}

fn with_trailing_slash(url: &Url) -> Url {
  let mut url = url.clone();
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  url
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> HttpTelemetryClient {
    HttpTelemetryClient::new(&Url::parse(base).unwrap(), Duration::from_millis(500)).unwrap()
  }

  #[test]
  fn endpoints_keep_api_prefix() {
    let client = client("http://localhost:8000/api/v1");
    let url = client
      .camera_endpoint(&CameraId::from("cam 1"), "chair-tracking")
      .unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/v1/cameras/cam%201/chair-tracking");
  }

  #[test]
  fn trailing_slash_is_not_doubled() {
    let client = client("http://localhost:8000/api/v1/");
    assert_eq!(client.base().as_str(), "http://localhost:8000/api/v1/");
  }

  #[tokio::test]
  async fn unreachable_backend_is_an_error() {
    // 端口 9 (discard) 上通常没有 HTTP 服务
    let client = client("http://127.0.0.1:9/api/v1");
    let result = client.detections(&CameraId::from("cam")).await;
    assert!(result.is_err());
  }
}
