// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/scoring/color_analysis.rs - 检测区域像素颜色分析
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

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::color::rgb_to_hsv;
use crate::detection::Detection;

// HSV 阈值（0-255 刻度）
const DARK_VALUE: u8 = 40;
const LOW_SATURATION: u8 = 25;
const GREEN_HUE: std::ops::RangeInclusive<u8> = 60..=140;
const YELLOW_HUE: std::ops::Range<u8> = 25..60;

/// 像素颜色类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
  Green,
  Yellow,
  /// 干枯组织或土壤
  Brown,
}

/// 对一个 HSV 像素分类
pub fn classify_hsv([h, s, v]: [u8; 3]) -> PixelClass {
  if v < DARK_VALUE || s < LOW_SATURATION {
    PixelClass::Brown
  } else if GREEN_HUE.contains(&h) {
    PixelClass::Green
  } else if YELLOW_HUE.contains(&h) {
    PixelClass::Yellow
  } else {
    PixelClass::Brown
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelCounts {
  pub green: usize,
  pub yellow: usize,
  pub brown: usize,
}

impl PixelCounts {
  pub fn total(&self) -> usize {
    self.green + self.yellow + self.brown
  }

  fn add(&mut self, class: PixelClass) {
    match class {
      PixelClass::Green => self.green += 1,
      PixelClass::Yellow => self.yellow += 1,
      PixelClass::Brown => self.brown += 1,
    }
  }
}

/// 统计所有检测区域内的像素颜色
///
/// 每个区域先缩放到 `size × size` 再分类。没有任何可用区域时返回 None。
pub fn count_pixels(image: &RgbImage, detections: &[Detection], size: u32) -> Option<PixelCounts> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return None;
  }

  let mut counts = PixelCounts::default();
  for detection in detections {
    let Some((x, y, w, h)) = crop_region(detection, width, height) else {
      continue;
    };

    let crop = imageops::crop_imm(image, x, y, w, h).to_image();
    let small = imageops::resize(&crop, size, size, FilterType::CatmullRom);
    for pixel in small.pixels() {
      counts.add(classify_hsv(rgb_to_hsv(*pixel)));
    }
  }

  (counts.total() > 0).then_some(counts)
}

/// 检测外接矩形对应的整数裁剪区域 (x, y, w, h)
fn crop_region(detection: &Detection, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
  let [x1, y1, x2, y2] = detection.geometry.bounds();
  if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
    return None;
  }

  // 起点截断到 [0, size-1]，终点截断到 [0, size]
  let x1 = (x1.trunc() as i64).clamp(0, width as i64 - 1);
  let y1 = (y1.trunc() as i64).clamp(0, height as i64 - 1);
  let x2 = (x2.trunc() as i64).clamp(0, width as i64);
  let y2 = (y2.trunc() as i64).clamp(0, height as i64);
  if x2 <= x1 || y2 <= y1 {
    return None;
  }

  Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::{ClassKey, Geometry};
  use image::Rgb;

  fn boxed(bbox: [f64; 4]) -> Detection {
    Detection {
      geometry: Geometry::Box(bbox),
      label: "corn".to_string(),
      class_key: ClassKey::Name("corn".to_string()),
      confidence: None,
    }
  }

  #[test]
  fn hsv_buckets() {
    assert_eq!(classify_hsv([100, 200, 30]), PixelClass::Brown);
    assert_eq!(classify_hsv([100, 10, 200]), PixelClass::Brown);
    assert_eq!(classify_hsv([60, 200, 200]), PixelClass::Green);
    assert_eq!(classify_hsv([140, 200, 200]), PixelClass::Green);
    assert_eq!(classify_hsv([25, 200, 200]), PixelClass::Yellow);
    assert_eq!(classify_hsv([59, 200, 200]), PixelClass::Yellow);
    assert_eq!(classify_hsv([10, 200, 200]), PixelClass::Brown);
    assert_eq!(classify_hsv([200, 200, 200]), PixelClass::Brown);
  }

  #[test]
  fn uniform_region_is_downsampled_and_counted() {
    let image = RgbImage::from_pixel(64, 48, Rgb([40, 170, 60]));
    let counts = count_pixels(&image, &[boxed([4.0, 4.0, 40.0, 30.0])], 16).unwrap();
    assert_eq!(counts.green, 256);
    assert_eq!(counts.total(), 256);
  }

  #[test]
  fn regions_outside_image_are_ignored() {
    let image = RgbImage::from_pixel(32, 32, Rgb([40, 170, 60]));
    assert!(count_pixels(&image, &[boxed([40.0, 40.0, 60.0, 60.0])], 8).is_none());
    assert!(count_pixels(&image, &[], 8).is_none());
  }

  #[test]
  fn polygon_uses_bounding_box() {
    let image = RgbImage::from_pixel(32, 32, Rgb([90, 60, 30]));
    let polygon = Detection {
      geometry: Geometry::Polygon(vec![(2.0, 2.0), (20.0, 4.0), (10.0, 18.0)]),
      ..boxed([0.0; 4])
    };
    let counts = count_pixels(&image, &[polygon], 4).unwrap();
    assert_eq!(counts.brown, 16);
  }
}
