// 该文件是 Shanan （山南西风） 项目的一部分。
// src/renderer/canvas.rs - 叠加层绘制表面
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::geometry::BoundingBox;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（无字体时的估计）
const LABEL_TEXT_PADDING: i32 = 2;
const BADGE_SPACING: i32 = 3;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Error, Debug)]
pub enum CanvasError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 从 TTF/OTF 文件加载标签字体
pub fn load_font(path: &Path) -> Result<FontArc, CanvasError> {
  let data = std::fs::read(path)?;
  Ok(FontArc::try_from_vec(data)?)
}

/// 透明绘制表面，尺寸跟随视频显示矩形
pub struct Canvas {
  image: RgbaImage,
  font: Option<FontArc>,
  font_scale: PxScale,
  label_text_height: i32,
  label_char_width: f32,
}

impl Default for Canvas {
  fn default() -> Self {
    Self::new(None)
  }
}

impl Canvas {
  /// 没有字体时只绘制标签底色
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      image: RgbaImage::new(0, 0),
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
    }
  }

  pub fn image(&self) -> &RgbaImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  /// 按显示矩形调整尺寸并清空
  pub fn prepare(&mut self, width: u32, height: u32) {
    if self.image.dimensions() != (width, height) {
      self.image = RgbaImage::new(width, height);
    } else {
      self.clear();
    }
  }

  pub fn clear(&mut self) {
    self.image.pixels_mut().for_each(|pixel| *pixel = TRANSPARENT);
  }

  /// 绘制显示坐标下的矩形边框，越界部分被裁剪
  pub fn draw_outline(&mut self, bbox: &BoundingBox, color: Rgba<u8>, thickness: u32) {
    let Some((x_min, y_min, x_max, y_max)) = self.clamp_box(bbox) else {
      return;
    };

    for t in 0..thickness as i32 {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(&mut self.image, rect, color);
    }
  }

  /// 在边框上方绘制标签，返回标签宽度
  pub fn draw_label_above(&mut self, bbox: &BoundingBox, text: &str, background: Rgba<u8>) -> i32 {
    let x = bbox.x1.floor() as i32;
    let y = bbox.y1.floor() as i32 - self.label_text_height;
    self.draw_badge(x.max(0), y.max(0), text, background)
  }

  /// 在边框下方从左到右依次绘制一排徽标
  pub fn draw_badges_below(&mut self, bbox: &BoundingBox, badges: &[(String, Rgba<u8>)]) {
    let mut x = (bbox.x1.floor() as i32).max(0);
    let max_y = self.image.height() as i32 - self.label_text_height;
    let y = (bbox.y2.ceil() as i32 + 1).min(max_y).max(0);
    for (text, background) in badges {
      let width = self.draw_badge(x, y, text, *background);
      x += width + BADGE_SPACING;
    }
  }

  /// 绘制带底色的文本徽标，返回实际宽度；超出表面时返回 0
  pub fn draw_badge(&mut self, x: i32, y: i32, text: &str, background: Rgba<u8>) -> i32 {
    if self.is_empty() || x >= self.image.width() as i32 || y >= self.image.height() as i32 {
      return 0;
    }

    let text_width = self.text_width(text) + 2 * LABEL_TEXT_PADDING;
    let max_width = (self.image.width() as i32 - x).max(0);
    let width = text_width.min(max_width);
    let height = self.label_text_height;
    if width <= 0 || height <= 0 {
      return 0;
    }

    let rect = Rect::at(x, y).of_size(width as u32, height as u32);
    draw_filled_rect_mut(&mut self.image, rect, background);

    if let Some(font) = &self.font {
      draw_text_mut(
        &mut self.image,
        TEXT_COLOR,
        x + LABEL_TEXT_PADDING,
        y + LABEL_TEXT_PADDING,
        self.font_scale,
        font,
        text,
      );
    }
    width
  }

  /// 将整幅图像缩放到 `target` 区域并按不透明度绘制
  pub fn draw_image(&mut self, image: &RgbaImage, target: &BoundingBox, opacity: f32) {
    let Some((x_min, y_min, x_max, y_max)) = self.clamp_box(target) else {
      return;
    };
    let (width, height) = ((x_max - x_min) as u32, (y_max - y_min) as u32);
    let scaled;
    let source = if image.dimensions() == (width, height) {
      image
    } else {
      scaled = imageops::resize(image, width, height, FilterType::Triangle);
      &scaled
    };

    let opacity = opacity.clamp(0.0, 1.0);
    for (x, y, pixel) in source.enumerate_pixels() {
      let mut pixel = *pixel;
      pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
      self.image.put_pixel(x_min as u32 + x, y_min as u32 + y, pixel);
    }
  }

  fn text_width(&self, text: &str) -> i32 {
    match &self.font {
      Some(font) => text_size(self.font_scale, font, text).0 as i32,
      None => (text.chars().count() as f32 * self.label_char_width) as i32,
    }
  }

  fn clamp_box(&self, bbox: &BoundingBox) -> Option<(i32, i32, i32, i32)> {
    if self.is_empty() {
      return None;
    }
    let (w, h) = (self.image.width() as i32, self.image.height() as i32);
    let x_min = (bbox.x1.floor() as i32).clamp(0, w);
    let y_min = (bbox.y1.floor() as i32).clamp(0, h);
    let x_max = (bbox.x2.ceil() as i32).clamp(0, w);
    let y_max = (bbox.y2.ceil() as i32).clamp(0, h);
    if x_min >= x_max || y_min >= y_max {
      return None;
    }
    Some((x_min, y_min, x_max, y_max))
  }
}

/// HSV 转 RGBA
pub fn hsv_to_rgba(h: f32, s: f32, v: f32) -> Rgba<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgba([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
    255,
  ])
}

/// 按名称稳定地选取调色板颜色
pub fn palette_color(key: &str) -> Rgba<u8> {
  const PALETTE_SIZE: u32 = 80;
  // FNV-1a
  let hash = key
    .bytes()
    .fold(0x811c_9dc5u32, |hash, byte| (hash ^ byte as u32).wrapping_mul(0x0100_0193));
  let hue = (hash % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32 * 360.0;
  hsv_to_rgba(hue, 0.8, 0.9)
}

#[cfg(test)]
mod tests {
  use super::*;

  const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

  #[test]
  fn prepare_resizes_and_clears() {
    let mut canvas = Canvas::default();
    canvas.prepare(40, 30);
    canvas.draw_outline(&BoundingBox::new(5.0, 5.0, 20.0, 20.0), RED, 2);
    assert_eq!(canvas.image().get_pixel(5, 5), &RED);
    canvas.prepare(40, 30);
    assert!(canvas.image().pixels().all(|p| p[3] == 0));
    canvas.prepare(80, 60);
    assert_eq!(canvas.image().dimensions(), (80, 60));
  }

  #[test]
  fn outline_is_clipped_to_surface() {
    let mut canvas = Canvas::default();
    canvas.prepare(20, 20);
    canvas.draw_outline(&BoundingBox::new(-10.0, -10.0, 50.0, 50.0), RED, 1);
    assert_eq!(canvas.image().get_pixel(0, 0), &RED);
    assert_eq!(canvas.image().get_pixel(10, 10)[3], 0);
  }

  #[test]
  fn degenerate_box_draws_nothing() {
    let mut canvas = Canvas::default();
    canvas.prepare(20, 20);
    canvas.draw_outline(&BoundingBox::new(30.0, 30.0, 40.0, 40.0), RED, 2);
    canvas.draw_outline(&BoundingBox::new(5.0, 5.0, 5.0, 9.0), RED, 2);
    assert!(canvas.image().pixels().all(|p| p[3] == 0));
  }

  #[test]
  fn zero_sized_surface_is_safe() {
    let mut canvas = Canvas::default();
    canvas.prepare(0, 0);
    canvas.draw_outline(&BoundingBox::new(0.0, 0.0, 10.0, 10.0), RED, 2);
    assert_eq!(canvas.draw_badge(0, 0, "label", RED), 0);
    canvas.draw_image(&RgbaImage::new(4, 4), &BoundingBox::new(0.0, 0.0, 4.0, 4.0), 1.0);
  }

  #[test]
  fn badge_without_font_fills_background() {
    let mut canvas = Canvas::default();
    canvas.prepare(200, 100);
    let width = canvas.draw_badge(10, 10, "abc", RED);
    assert!(width > 0);
    assert_eq!(canvas.image().get_pixel(11, 11), &RED);
  }

  #[test]
  fn image_is_scaled_with_opacity() {
    let mut canvas = Canvas::default();
    canvas.prepare(20, 10);
    let source = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 255, 255]));
    canvas.draw_image(&source, &BoundingBox::new(0.0, 0.0, 20.0, 10.0), 0.5);
    let pixel = canvas.image().get_pixel(10, 5);
    assert_eq!(pixel[2], 255);
    assert_eq!(pixel[3], 128);
  }

  #[test]
  fn palette_is_stable() {
    assert_eq!(palette_color("person"), palette_color("person"));
    assert_eq!(palette_color("person")[3], 255);
  }
}
