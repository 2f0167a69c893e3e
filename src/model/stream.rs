// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/stream.rs - 事件流消息
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

use serde::Deserialize;

use crate::model::{Alert, CameraId, Caption, Severity, WireId, parse_timestamp};

/// 事件流上的一帧文本消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
  Anomaly(AnomalyMessage),
  Caption(CaptionMessage),
  Pong,
  /// 其它类型的消息，订阅者自行忽略
  #[serde(other)]
  Other,
}

impl StreamMessage {
  pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(text)
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnomalyMessage {
  #[serde(default)]
  pub anomaly_id: Option<WireId>,
  #[serde(default)]
  pub id: Option<WireId>,
  #[serde(default)]
  pub rule_name: Option<String>,
  #[serde(default)]
  pub camera_id: Option<CameraId>,
  #[serde(default)]
  pub caption: Option<String>,
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(default)]
  pub detected_at: Option<String>,
  #[serde(default)]
  pub timestamp: Option<String>,
}

impl AnomalyMessage {
  pub fn into_alert(self) -> Alert {
    let detected_at = self
      .detected_at
      .as_deref()
      .or(self.timestamp.as_deref())
      .and_then(parse_timestamp);
    Alert {
      id: self.anomaly_id.or(self.id).map(WireId::into_string),
      severity: self
        .severity
        .as_deref()
        .map(Severity::from_wire)
        .unwrap_or(Severity::Medium),
      rule_name: self.rule_name.unwrap_or_else(|| "Unknown".to_string()),
      camera_id: self.camera_id,
      caption: self.caption.unwrap_or_default(),
      detected_at,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeRange {
  #[serde(default)]
  pub start: Option<String>,
  #[serde(default)]
  pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptionMessage {
  #[serde(default)]
  pub event_id: Option<WireId>,
  #[serde(default)]
  pub camera_id: Option<CameraId>,
  #[serde(default)]
  pub caption: String,
  #[serde(default)]
  pub confidence: Option<f32>,
  #[serde(default)]
  pub timestamp: Option<String>,
  #[serde(default)]
  pub frames_analyzed: Option<u32>,
  #[serde(default)]
  pub time_range: Option<TimeRange>,
}

impl CaptionMessage {
  /// `channel_camera` 是订阅的频道所属摄像头，消息未携带 `camera_id` 时使用
  pub fn into_caption(self, channel_camera: &CameraId) -> Caption {
    let camera_id = self.camera_id.unwrap_or_else(|| channel_camera.clone());
    let timestamp = self.timestamp.unwrap_or_default();
    let (start, end) = match self.time_range {
      Some(range) => (range.start, range.end),
      None => (Some(timestamp.clone()), None),
    };
    let id = match self.event_id {
      Some(id) => id.into_string(),
      None => format!("{camera_id}@{timestamp}"),
    };
    Caption {
      id,
      camera_id,
      text: self.caption,
      confidence: self.confidence.unwrap_or(0.0),
      time_range_start: start.as_deref().and_then(parse_timestamp),
      time_range_end: end.as_deref().and_then(parse_timestamp),
      frames_analyzed: self.frames_analyzed.unwrap_or(0),
    }
  }
}
