// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 叠加层数据模型
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
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::geometry::BoundingBox;

pub mod stream;
pub mod telemetry;

/// 摄像头标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CameraId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for CameraId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for CameraId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// 可以在叠加层上标注的实体
pub trait WithLabel: Sized + fmt::Debug {
  fn bbox(&self) -> BoundingBox;
  fn to_label_str(&self) -> String;
}

/// 单次轮询的目标检测结果，下次刷新时整体替换
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub id: u32,
  pub bbox: BoundingBox,
  pub label: String,
  pub confidence: f32,
}

impl WithLabel for Detection {
  fn bbox(&self) -> BoundingBox {
    self.bbox
  }

  fn to_label_str(&self) -> String {
    format!("{} {:.2}", self.label, self.confidence)
  }
}

/// 跨摄像头重识别的人员
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPerson {
  pub detection: Detection,
  /// 跨摄像头稳定，作为行动轨迹的关联键
  pub person_id: String,
  /// 仅在首次分配身份的那一轮为 true
  pub is_new: bool,
  pub cameras_visited: Vec<CameraId>,
  pub similarity: f32,
}

impl WithLabel for TrackedPerson {
  fn bbox(&self) -> BoundingBox {
    self.detection.bbox
  }

  fn to_label_str(&self) -> String {
    format!("{} {:.2}", self.person_id, self.similarity)
  }
}

/// 椅子占用状态
///
/// `occupied_duration_seconds` 由服务端计算：占用开始的那一轮归零，
/// 占用期间单调递增。客户端只展示，不在两次轮询之间外推。
#[derive(Debug, Clone, PartialEq)]
pub struct ChairState {
  pub chair_id: u32,
  pub bbox: BoundingBox,
  pub occupied: bool,
  pub occupied_duration_seconds: u64,
  pub confidence: f32,
  pub detection_method: Option<String>,
}

impl WithLabel for ChairState {
  fn bbox(&self) -> BoundingBox {
    self.bbox
  }

  fn to_label_str(&self) -> String {
    let status = if self.occupied { "occupied" } else { "empty" };
    format!("chair#{} {}", self.chair_id, status)
  }
}

/// 深度统计
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct DepthStats {
  #[serde(alias = "min", default)]
  pub min_depth: f32,
  #[serde(alias = "max", default)]
  pub max_depth: f32,
}

/// 每个摄像头当前唯一的深度帧；新帧整体替换旧帧
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
  /// base64 编码的 PNG
  pub raster: Arc<str>,
  pub stats: DepthStats,
}

/// 实时字幕，创建后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
  pub id: String,
  pub camera_id: CameraId,
  pub text: String,
  pub confidence: f32,
  pub time_range_start: Option<NaiveDateTime>,
  pub time_range_end: Option<NaiveDateTime>,
  pub frames_analyzed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  /// 未知取值按 medium 处理
  pub fn from_wire(value: &str) -> Self {
    match value.trim().to_ascii_lowercase().as_str() {
      "critical" => Severity::Critical,
      "high" => Severity::High,
      "low" => Severity::Low,
      _ => Severity::Medium,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Low => "low",
      Severity::Medium => "medium",
      Severity::High => "high",
      Severity::Critical => "critical",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 异常告警，创建后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
  /// 服务端身份；缺失时由去重器分配合成身份
  pub id: Option<String>,
  pub severity: Severity,
  pub rule_name: String,
  pub camera_id: Option<CameraId>,
  pub caption: String,
  pub detected_at: Option<NaiveDateTime>,
}

/// 解析 ISO-8601 时间，带或不带时区偏移均可
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
  if let Ok(time) = DateTime::parse_from_rfc3339(value) {
    return Some(time.naive_utc());
  }
  NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
    .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
    .ok()
}

/// 线上标识既可能是字符串也可能是数字
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
  Text(String),
  Integer(i64),
  Float(f64),
}

impl WireId {
  pub fn into_string(self) -> String {
    match self {
      WireId::Text(text) => text,
      WireId::Integer(value) => value.to_string(),
      WireId::Float(value) => value.to_string(),
    }
  }
}
