// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/telemetry.rs - 遥测接口响应结构
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

use std::sync::Arc;

use serde::Deserialize;

use crate::geometry::BoundingBox;
use crate::model::{CameraId, ChairState, DepthFrame, DepthStats, Detection, TrackedPerson, WireId};

/// 所有遥测响应共有的 `success` / `error` 外壳
pub trait Envelope {
  fn success(&self) -> bool;
  fn error(&self) -> Option<&str>;
}

macro_rules! impl_envelope {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Envelope for $ty {
        fn success(&self) -> bool {
          self.success
        }

        fn error(&self) -> Option<&str> {
          self.error.as_deref()
        }
      }
    )*
  };
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionItem {
  pub bbox: BoundingBox,
  pub label: String,
  pub confidence: f32,
}

/// `GET /cameras/{id}/detections`
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionsResponse {
  pub success: bool,
  #[serde(default)]
  pub detections: Vec<DetectionItem>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub debug_info: Option<serde_json::Value>,
}

impl DetectionsResponse {
  pub fn into_detections(self) -> Vec<Detection> {
    self
      .detections
      .into_iter()
      .enumerate()
      .map(|(index, item)| Detection {
        id: index as u32,
        bbox: item.bbox,
        label: item.label,
        confidence: item.confidence,
      })
      .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChairItem {
  pub chair_id: u32,
  pub bbox: BoundingBox,
  pub occupied: bool,
  #[serde(default)]
  pub duration_seconds: u64,
  #[serde(default)]
  pub confidence: f32,
  #[serde(default)]
  pub detection_method: Option<String>,
}

/// `GET /cameras/{id}/chair-tracking`
#[derive(Debug, Clone, Deserialize)]
pub struct ChairTrackingResponse {
  pub success: bool,
  #[serde(default)]
  pub chairs: Vec<ChairItem>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub debug_info: Option<serde_json::Value>,
}

impl ChairTrackingResponse {
  pub fn into_chairs(self) -> Vec<ChairState> {
    self
      .chairs
      .into_iter()
      .map(|item| ChairState {
        chair_id: item.chair_id,
        bbox: item.bbox,
        occupied: item.occupied,
        occupied_duration_seconds: item.duration_seconds,
        confidence: item.confidence,
        detection_method: item.detection_method,
      })
      .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReidItem {
  pub camera_id: CameraId,
  pub person_id: WireId,
  pub bbox: BoundingBox,
  #[serde(default)]
  pub confidence: f32,
  #[serde(default)]
  pub similarity: f32,
  #[serde(default)]
  pub is_new: bool,
  #[serde(default)]
  pub cameras_visited: Vec<CameraId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionItem {
  pub person_id: WireId,
  pub from_camera: CameraId,
  pub to_camera: CameraId,
  #[serde(default)]
  pub time: Option<String>,
  #[serde(default)]
  pub similarity: f32,
}

/// `GET /person-reid/reid/track?camera_ids=...`
#[derive(Debug, Clone, Deserialize)]
pub struct ReidTrackResponse {
  pub success: bool,
  #[serde(default)]
  pub detections: Vec<ReidItem>,
  #[serde(default)]
  pub transitions: Vec<TransitionItem>,
  #[serde(default)]
  pub error: Option<String>,
}

impl ReidTrackResponse {
  /// 只保留属于指定摄像头的人员
  pub fn into_persons(self, camera_id: &CameraId) -> Vec<TrackedPerson> {
    self
      .detections
      .into_iter()
      .filter(|item| &item.camera_id == camera_id)
      .enumerate()
      .map(|(index, item)| TrackedPerson {
        detection: Detection {
          id: index as u32,
          bbox: item.bbox,
          label: "person".to_string(),
          confidence: item.confidence,
        },
        person_id: item.person_id.into_string(),
        is_new: item.is_new,
        cameras_visited: item.cameras_visited,
        similarity: item.similarity,
      })
      .collect()
  }
}

/// `GET /cameras/{id}/depth-map`
#[derive(Debug, Clone, Deserialize)]
pub struct DepthMapResponse {
  pub success: bool,
  #[serde(default)]
  pub depth_image: Option<String>,
  #[serde(default)]
  pub depth_stats: Option<DepthStats>,
  #[serde(default)]
  pub error: Option<String>,
}

impl DepthMapResponse {
  pub fn into_frame(self) -> Option<DepthFrame> {
    let raster = self.depth_image?;
    Some(DepthFrame {
      raster: Arc::from(raster),
      stats: self.depth_stats.unwrap_or_default(),
    })
  }
}

impl_envelope!(
  DetectionsResponse,
  ChairTrackingResponse,
  ReidTrackResponse,
  DepthMapResponse,
);

/// `GET /cameras/{id}/stream`，内核只解析不选择传输方式
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamInfo {
  Hls { playlist_url: String },
  Http { proxy_url: String },
}

impl StreamInfo {
  pub fn playable_url(&self) -> &str {
    match self {
      StreamInfo::Hls { playlist_url } => playlist_url,
      StreamInfo::Http { proxy_url } => proxy_url,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detections_get_index_ids() {
    let body = r#"{
      "success": true,
      "detections": [
        {"bbox": [10, 20, 30, 40], "label": "person", "confidence": 0.91},
        {"bbox": [1.5, 2.5, 3.5, 4.5], "label": "chair", "confidence": 0.55}
      ],
      "count": 2,
      "camera_id": "cam-1"
    }"#;
    let response: DetectionsResponse = serde_json::from_str(body).unwrap();
    assert!(response.success());
    let detections = response.into_detections();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[1].id, 1);
    assert_eq!(detections[0].bbox, BoundingBox::new(10.0, 20.0, 30.0, 40.0));
    assert_eq!(detections[1].label, "chair");
  }

  #[test]
  fn failed_response_keeps_error() {
    let response: DetectionsResponse =
      serde_json::from_str(r#"{"success": false, "error": "AI service timeout"}"#).unwrap();
    assert!(!response.success());
    assert_eq!(response.error(), Some("AI service timeout"));
    assert!(response.into_detections().is_empty());
  }

  #[test]
  fn chair_tracking_maps_duration() {
    let body = r#"{
      "success": true,
      "chairs": [{
        "chair_id": 2, "bbox": [0, 0, 10, 10], "occupied": true,
        "duration_seconds": 42, "status": "occupied", "confidence": 0.7,
        "detection_method": "person_detection", "change_score": null
      }],
      "debug_info": {"chairs_detected": 1}
    }"#;
    let chairs = serde_json::from_str::<ChairTrackingResponse>(body)
      .unwrap()
      .into_chairs();
    assert_eq!(chairs[0].chair_id, 2);
    assert!(chairs[0].occupied);
    assert_eq!(chairs[0].occupied_duration_seconds, 42);
  }

  #[test]
  fn reid_filters_by_camera() {
    let body = r#"{
      "success": true,
      "detections": [
        {"camera_id": "a", "person_id": "person_1", "bbox": [0,0,5,5], "confidence": 0.9,
         "similarity": 0.8, "is_new": true, "cameras_visited": ["a"]},
        {"camera_id": "b", "person_id": 7, "bbox": [0,0,5,5], "confidence": 0.9,
         "similarity": 0.95, "is_new": false, "cameras_visited": ["a", "b"]}
      ],
      "transitions": [{"person_id": 7, "from_camera": "a", "to_camera": "b", "similarity": 0.95}]
    }"#;
    let response: ReidTrackResponse = serde_json::from_str(body).unwrap();
    assert_eq!(response.transitions.len(), 1);
    let persons = response.into_persons(&CameraId::from("b"));
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].person_id, "7");
    assert_eq!(persons[0].cameras_visited.len(), 2);
    assert!(!persons[0].is_new);
  }

  #[test]
  fn depth_stats_accept_short_keys() {
    let body = r#"{"success": true, "depth_image": "AAAA", "depth_stats": {"min": 0.5, "max": 9.0, "mean": 3.0}}"#;
    let frame = serde_json::from_str::<DepthMapResponse>(body)
      .unwrap()
      .into_frame()
      .unwrap();
    assert_eq!(&*frame.raster, "AAAA");
    assert_eq!(frame.stats.max_depth, 9.0);
  }

  #[test]
  fn stream_info_is_tagged_by_type() {
    let hls: StreamInfo =
      serde_json::from_str(r#"{"type": "hls", "playlist_url": "/hls/cam/index.m3u8"}"#).unwrap();
    assert_eq!(hls.playable_url(), "/hls/cam/index.m3u8");
    let http: StreamInfo = serde_json::from_str(r#"{"type": "http", "proxy_url": "/proxy"}"#).unwrap();
    assert!(matches!(http, StreamInfo::Http { .. }));
  }
}
