// 该文件是 Shanan （山南西风） 项目的一部分。
// src/renderer/painters.rs - 各类叠加层的绘制
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
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::canvas::{Canvas, palette_color};
use super::{OverlayKind, OverlayPainter};
use crate::depth::DepthAsset;
use crate::geometry::{BoundingBox, CoordinateMapper};
use crate::model::{ChairState, Detection, TrackedPerson, WithLabel};

const OUTLINE_THICKNESS: u32 = 2;
const CHAIR_EMPTY_COLOR: Rgba<u8> = Rgba([0, 200, 83, 255]);
const CHAIR_OCCUPIED_COLOR: Rgba<u8> = Rgba([229, 57, 53, 255]);
const NEW_BADGE_COLOR: Rgba<u8> = Rgba([245, 166, 35, 255]);
const INFO_BADGE_COLOR: Rgba<u8> = Rgba([33, 33, 33, 255]);

/// `m:ss`，超过一小时为 `h:mm:ss`
pub fn format_duration(seconds: u64) -> String {
  let (hours, minutes, seconds) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
  if hours > 0 {
    format!("{hours}:{minutes:02}:{seconds:02}")
  } else {
    format!("{minutes}:{seconds:02}")
  }
}

/// 目标检测框
#[derive(Debug, Default)]
pub struct ObjectPainter;

impl OverlayPainter for ObjectPainter {
  type Data = Vec<Detection>;

  fn kind(&self) -> OverlayKind {
    OverlayKind::Objects
  }

  fn paint_bodies(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data) {
    for detection in data {
      let bbox = mapper.map_box(detection.bbox());
      canvas.draw_outline(&bbox, palette_color(&detection.label), OUTLINE_THICKNESS);
    }
  }

  fn paint_labels(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data) {
    for detection in data {
      let bbox = mapper.map_box(detection.bbox());
      canvas.draw_label_above(&bbox, &detection.to_label_str(), palette_color(&detection.label));
    }
  }
}

/// 跨摄像头重识别的人员
#[derive(Debug, Default)]
pub struct PersonPainter;

impl OverlayPainter for PersonPainter {
  type Data = Vec<TrackedPerson>;

  fn kind(&self) -> OverlayKind {
    OverlayKind::Persons
  }

  fn paint_bodies(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data) {
    for person in data {
      let bbox = mapper.map_box(person.bbox());
      canvas.draw_outline(&bbox, palette_color(&person.person_id), OUTLINE_THICKNESS);
    }
  }

  fn paint_labels(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data) {
    for person in data {
      let bbox = mapper.map_box(person.bbox());
      canvas.draw_label_above(&bbox, &person.to_label_str(), palette_color(&person.person_id));

      let mut badges = Vec::with_capacity(2);
      if person.is_new {
        badges.push(("NEW".to_string(), NEW_BADGE_COLOR));
      }
      if person.cameras_visited.len() > 1 {
        badges.push((format!("{} cams", person.cameras_visited.len()), INFO_BADGE_COLOR));
      }
      canvas.draw_badges_below(&bbox, &badges);
    }
  }
}

/// 椅子占用状态
///
/// 时长以服务端为准；同一状态内只显示不减少的时长，状态翻转时重新开始。
#[derive(Debug, Default)]
pub struct ChairPainter {
  displayed: HashMap<u32, (bool, u64)>,
}

impl ChairPainter {
  /// 最近一帧为该椅子显示的秒数
  pub fn displayed_seconds(&self, chair_id: u32) -> Option<u64> {
    self.displayed.get(&chair_id).map(|(_, seconds)| *seconds)
  }

  fn track(&mut self, chair: &ChairState) -> u64 {
    let entry = self
      .displayed
      .entry(chair.chair_id)
      .or_insert((chair.occupied, chair.occupied_duration_seconds));
    if entry.0 != chair.occupied {
      *entry = (chair.occupied, chair.occupied_duration_seconds);
    } else {
      entry.1 = entry.1.max(chair.occupied_duration_seconds);
    }
    entry.1
  }

  fn color(chair: &ChairState) -> Rgba<u8> {
    if chair.occupied {
      CHAIR_OCCUPIED_COLOR
    } else {
      CHAIR_EMPTY_COLOR
    }
  }
}

impl OverlayPainter for ChairPainter {
  type Data = Vec<ChairState>;

  fn kind(&self) -> OverlayKind {
    OverlayKind::Chairs
  }

  fn paint_bodies(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data) {
    for chair in data {
      let bbox = mapper.map_box(chair.bbox());
      canvas.draw_outline(&bbox, Self::color(chair), OUTLINE_THICKNESS);
    }
  }

  fn paint_labels(&mut self, canvas: &mut Canvas, mapper: &CoordinateMapper, data: &Self::Data) {
    for chair in data {
      let bbox = mapper.map_box(chair.bbox());
      let seconds = self.track(chair);
      canvas.draw_label_above(&bbox, &chair.to_label_str(), Self::color(chair));
      canvas.draw_badges_below(
        &bbox,
        &[
          (format_duration(seconds), INFO_BADGE_COLOR),
          (format!("{:.0}%", chair.confidence * 100.0), INFO_BADGE_COLOR),
        ],
      );
    }
    self
      .displayed
      .retain(|chair_id, _| data.iter().any(|chair| chair.chair_id == *chair_id));
  }
}

/// 深度图，铺满视频显示矩形
pub struct DepthPainter {
  opacity: f32,
  // 按源图像和目标尺寸缓存缩放结果，避免每帧重新缩放
  scaled: Option<(Arc<RgbaImage>, (u32, u32), RgbaImage)>,
}

impl DepthPainter {
  pub fn new(opacity: f32) -> Self {
    Self {
      opacity,
      scaled: None,
    }
  }

  fn scaled_for<'a>(&'a mut self, source: &'a Arc<RgbaImage>, size: (u32, u32)) -> &'a RgbaImage {
    let stale = match &self.scaled {
      Some((cached, cached_size, _)) => !Arc::ptr_eq(cached, source) || *cached_size != size,
      None => true,
    };
    if stale {
      let image = imageops::resize(source.as_ref(), size.0, size.1, FilterType::Triangle);
      self.scaled = Some((source.clone(), size, image));
    }
    match &self.scaled {
      Some((_, _, image)) => image,
      None => source.as_ref(),
    }
  }
}

impl OverlayPainter for DepthPainter {
  type Data = Option<DepthAsset>;

  fn kind(&self) -> OverlayKind {
    OverlayKind::Depth
  }

  fn paint_bodies(&mut self, canvas: &mut Canvas, _mapper: &CoordinateMapper, data: &Self::Data) {
    // 解码尚未完成时不绘制
    let Some(asset) = data else {
      return;
    };
    let (width, height) = asset.image.dimensions();
    if width == 0 || height == 0 || canvas.is_empty() {
      return;
    }
    // 深度图对应整个原生帧，映射后即为整个显示矩形
    let size = (canvas.width(), canvas.height());
    let target = BoundingBox::new(0.0, 0.0, size.0 as f32, size.1 as f32);
    let opacity = self.opacity;
    let image = self.scaled_for(&asset.image, size);
    canvas.draw_image(image, &target, opacity);
  }

  fn paint_labels(&mut self, canvas: &mut Canvas, _mapper: &CoordinateMapper, data: &Self::Data) {
    if let Some(asset) = data {
      let text = format!(
        "depth {:.1}-{:.1}",
        asset.stats.min_depth, asset.stats.max_depth
      );
      canvas.draw_badge(4, 4, &text, INFO_BADGE_COLOR);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::NativeFrameGeometry;
  use crate::model::DepthStats;

  fn chair(occupied: bool, seconds: u64) -> ChairState {
    ChairState {
      chair_id: 1,
      bbox: BoundingBox::new(100.0, 100.0, 300.0, 300.0),
      occupied,
      occupied_duration_seconds: seconds,
      confidence: 0.9,
      detection_method: None,
    }
  }

  fn frame(painter: &mut impl OverlayPainter<Data = Vec<ChairState>>, data: &Vec<ChairState>) -> Canvas {
    let mapper = CoordinateMapper::new(&NativeFrameGeometry::new(1920, 1080, 960, 540));
    let mut canvas = Canvas::default();
    canvas.prepare(960, 540);
    painter.paint_bodies(&mut canvas, &mapper, data);
    painter.paint_labels(&mut canvas, &mapper, data);
    canvas
  }

  #[test]
  fn durations_format() {
    assert_eq!(format_duration(0), "0:00");
    assert_eq!(format_duration(75), "1:15");
    assert_eq!(format_duration(3725), "1:02:05");
  }

  #[test]
  fn chair_duration_is_monotonic_while_occupied() {
    let mut painter = ChairPainter::default();
    frame(&mut painter, &vec![chair(false, 30)]);
    let mut shown = Vec::new();
    for seconds in [0, 1, 1] {
      frame(&mut painter, &vec![chair(true, seconds)]);
      shown.push(painter.displayed_seconds(1).unwrap());
    }
    assert_eq!(shown, vec![0, 1, 1]);
    assert!(shown.windows(2).all(|pair| pair[0] <= pair[1]));
  }

  #[test]
  fn chair_duration_never_goes_backwards_within_a_state() {
    let mut painter = ChairPainter::default();
    frame(&mut painter, &vec![chair(true, 5)]);
    frame(&mut painter, &vec![chair(true, 3)]);
    assert_eq!(painter.displayed_seconds(1), Some(5));
    frame(&mut painter, &vec![chair(false, 0)]);
    assert_eq!(painter.displayed_seconds(1), Some(0));
  }

  #[test]
  fn vanished_chairs_are_forgotten() {
    let mut painter = ChairPainter::default();
    frame(&mut painter, &vec![chair(true, 5)]);
    frame(&mut painter, &Vec::new());
    assert_eq!(painter.displayed_seconds(1), None);
  }

  #[test]
  fn chair_color_follows_occupancy() {
    let mut painter = ChairPainter::default();
    let canvas = frame(&mut painter, &vec![chair(true, 1)]);
    // [100,100,300,300] 在 50% 缩放下为 [50,50,150,150]，检查右边框
    assert_eq!(canvas.image().get_pixel(149, 100), &CHAIR_OCCUPIED_COLOR);
  }

  #[test]
  fn labels_are_painted_over_bodies() {
    let mapper = CoordinateMapper::new(&NativeFrameGeometry::new(100, 100, 100, 100));
    let mut canvas = Canvas::default();
    canvas.prepare(100, 100);
    let detections = vec![
      Detection {
        id: 0,
        bbox: BoundingBox::new(10.0, 40.0, 60.0, 90.0),
        label: "person".to_string(),
        confidence: 0.9,
      },
      // 第二个框的上边框正好穿过第一个框的标签
      Detection {
        id: 1,
        bbox: BoundingBox::new(0.0, 25.0, 90.0, 95.0),
        label: "dog".to_string(),
        confidence: 0.8,
      },
    ];
    let mut painter = ObjectPainter;
    painter.paint_bodies(&mut canvas, &mapper, &detections);
    painter.paint_labels(&mut canvas, &mapper, &detections);
    // 第一个标签位于 y=20..40，x 从 10 开始
    assert_eq!(canvas.image().get_pixel(12, 25), &palette_color("person"));
  }

  #[test]
  fn depth_is_blended_over_display_rect() {
    let mapper = CoordinateMapper::new(&NativeFrameGeometry::new(1920, 1080, 64, 36));
    let mut canvas = Canvas::default();
    canvas.prepare(64, 36);
    let asset = Some(DepthAsset {
      image: Arc::new(RgbaImage::from_pixel(8, 4, Rgba([200, 100, 0, 255]))),
      stats: DepthStats {
        min_depth: 0.0,
        max_depth: 10.0,
      },
    });
    let mut painter = DepthPainter::new(0.6);
    painter.paint_bodies(&mut canvas, &mapper, &asset);
    let pixel = canvas.image().get_pixel(60, 30);
    assert_eq!(pixel[0], 200);
    assert_eq!(pixel[3], 153);
  }

  #[test]
  fn depth_without_asset_draws_nothing() {
    let mapper = CoordinateMapper::new(&NativeFrameGeometry::new(0, 0, 32, 32));
    let mut canvas = Canvas::default();
    canvas.prepare(32, 32);
    let mut painter = DepthPainter::new(0.6);
    painter.paint_bodies(&mut canvas, &mapper, &None);
    painter.paint_labels(&mut canvas, &mapper, &None);
    assert!(canvas.image().pixels().all(|p| p[3] == 0));
  }
}
