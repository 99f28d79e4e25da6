// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/output/save_polygon_image.rs - 半透明多边形叠加图像输出
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

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::color::class_color;
use crate::config::DrawConfig;
use crate::detection::{Detection, Geometry, GeometryPreference, Normalizer};
use crate::output::draw::{Draw, DrawOutcome, SkipReason, clip_polygon, prepare_output_path};
use crate::output::{OutputError, POLYGON_IMAGE_SCHEME, Render, RenderedImage, url_path};
use crate::{FromUrl, FromUrlWithScheme};

const LABEL_FOREGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 在透明叠加层上绘制多边形，再与原图合成后保存
pub struct SavePolygonImageOutput {
  path: PathBuf,
  draw: Draw,
}

impl FromUrlWithScheme for SavePolygonImageOutput {
  const SCHEME: &'static str = POLYGON_IMAGE_SCHEME;
}

impl FromUrl for SavePolygonImageOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_config(url, &DrawConfig::default())
  }
}

fn with_alpha(Rgb([r, g, b]): Rgb<u8>, alpha: u8) -> Rgba<u8> {
  Rgba([r, g, b, alpha])
}

/// 取整并去掉相邻重复点（包括首尾重合），供填充使用
fn fill_points(points: &[(f64, f64)]) -> Vec<Point<i32>> {
  let mut result: Vec<Point<i32>> = Vec::with_capacity(points.len());
  for &(x, y) in points {
    let point = Point::new(x.round() as i32, y.round() as i32);
    if result.last() != Some(&point) {
      result.push(point);
    }
  }
  while result.len() > 1 && result.first() == result.last() {
    result.pop();
  }
  result
}

/// 叠加层按透明度合成到不透明原图上
fn composite(base: &RgbImage, overlay: &RgbaImage) -> RgbImage {
  let mut output = base.clone();
  for (pixel, top) in output.pixels_mut().zip(overlay.pixels()) {
    let alpha = top[3] as u32;
    if alpha == 0 {
      continue;
    }
    for channel in 0..3 {
      let blended = (pixel[channel] as u32 * (255 - alpha) + top[channel] as u32 * alpha + 127) / 255;
      pixel[channel] = blended as u8;
    }
  }
  output
}

impl SavePolygonImageOutput {
  pub fn from_url_with_config(url: &Url, config: &DrawConfig) -> Result<Self, OutputError> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(Self::new(url_path(url)?, Draw::new(config)))
  }

  pub fn new(path: PathBuf, draw: Draw) -> Self {
    Self { path, draw }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 在叠加层上绘制全部多边形检测
  pub fn draw_polygons(
    &self,
    overlay: &mut RgbaImage,
    detections: &[Detection],
  ) -> Vec<DrawOutcome> {
    detections
      .iter()
      .map(|detection| {
        let outcome = self.draw_one(overlay, detection);
        if let DrawOutcome::Skipped(reason) = outcome {
          debug!("跳过多边形 '{}': {:?}", detection.label, reason);
        }
        outcome
      })
      .collect()
  }

  fn draw_one(&self, overlay: &mut RgbaImage, detection: &Detection) -> DrawOutcome {
    let points = match &detection.geometry {
      Geometry::Polygon(points) if !points.is_empty() => points,
      Geometry::Polygon(_) => return DrawOutcome::Skipped(SkipReason::TooFewPoints),
      Geometry::Box(_) => return DrawOutcome::Skipped(SkipReason::NotPolygon),
    };
    let (width, height) = (overlay.width() as i32, overlay.height() as i32);
    if width == 0 || height == 0 {
      return DrawOutcome::Skipped(SkipReason::Degenerate);
    }
    let color = class_color(&detection.class_key);

    // 填充前裁剪到画布外扩一像素的范围，避免远离画布的顶点
    let visible = clip_polygon(points, [-1.0, -1.0, width as f64, height as f64]);
    let filled = fill_points(&visible);
    if filled.len() >= 3 {
      draw_polygon_mut(overlay, &filled, with_alpha(color, self.draw.fill_alpha()));
    }
    self.draw.draw_closed_outline(overlay, points, with_alpha(color, 255));

    // 标签锚点取顶点的算术平均
    let count = points.len() as f64;
    let cx = points.iter().map(|(x, _)| x).sum::<f64>() / count;
    let cy = points.iter().map(|(_, y)| y).sum::<f64>() / count;

    let (text_w, text_h) = self.draw.text_extent(&detection.label);
    let pad = self.draw.padding();
    let (label_w, label_h) = (text_w + 2 * pad, text_h + 2 * pad);
    let x0 = (cx - (label_w / 2) as f64).clamp(0.0, (width - 1) as f64) as i32;
    let y0 = (cy - (label_h / 2) as f64).clamp(0.0, (height - 1) as f64) as i32;
    let x1 = (x0 + label_w).min(width);
    let y1 = (y0 + label_h).min(height);
    self.draw.draw_label(
      overlay,
      [x0, y0, x1, y1],
      &detection.label,
      with_alpha(color, self.draw.label_alpha()),
      LABEL_FOREGROUND,
    );

    DrawOutcome::Drawn
  }

  /// 归一化原始检测并渲染到指定路径，输出为不透明图像
  pub fn render_into(
    &self,
    image: &RgbImage,
    raws: &[Value],
    path: &Path,
  ) -> Result<RenderedImage, OutputError> {
    let start = Instant::now();
    let detections = Normalizer::new(image.width(), image.height())
      .with_preference(GeometryPreference::PolygonFirst)
      .normalize_all(raws);

    let mut overlay = RgbaImage::new(image.width(), image.height());
    let outcomes = self.draw_polygons(&mut overlay, &detections);
    let drawn = outcomes
      .iter()
      .filter(|outcome| **outcome == DrawOutcome::Drawn)
      .count();
    let output = composite(image, &overlay);

    let path = prepare_output_path(path)?;
    output.save(&path)?;
    info!(
      "保存多边形叠加图像到文件: {} ({} 个多边形, 用时 {:?})",
      path.display(),
      drawn,
      start.elapsed()
    );

    Ok(RenderedImage {
      path,
      drawn,
      skipped: raws.len() - drawn,
    })
  }
}

impl Render<RgbImage, [Value]> for SavePolygonImageOutput {
  type Error = OutputError;

  fn render_result(
    &self,
    image: &RgbImage,
    result: &[Value],
  ) -> Result<RenderedImage, Self::Error> {
    self.render_into(image, result, &self.path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::ClassKey;
  use serde_json::json;

  fn output(path: PathBuf) -> SavePolygonImageOutput {
    SavePolygonImageOutput::new(path, Draw::default().without_font())
  }

  #[test]
  fn closing_and_repeated_points_are_removed() {
    let points = fill_points(&[(1.0, 1.0), (1.2, 0.9), (5.0, 1.0), (5.0, 5.0), (1.0, 1.0)]);
    assert_eq!(
      points,
      vec![Point::new(1, 1), Point::new(5, 1), Point::new(5, 5)]
    );
    assert_eq!(fill_points(&[(2.0, 2.0), (2.0, 2.0)]), vec![Point::new(2, 2)]);
  }

  #[test]
  fn composite_blends_by_alpha() {
    let base = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
    let mut overlay = RgbaImage::new(2, 1);
    overlay.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
    overlay.put_pixel(1, 0, Rgba([255, 0, 0, 90]));
    let out = composite(&base, &overlay);
    assert_eq!(*out.get_pixel(0, 0), Rgb([255, 255, 255]));
    assert_eq!(*out.get_pixel(1, 0), Rgb([90, 0, 0]));
  }

  #[test]
  fn box_only_and_degenerate_inputs_are_skipped() {
    let output = output(PathBuf::from("unused.png"));
    let mut overlay = RgbaImage::new(40, 40);
    let detections = Normalizer::new(40, 40)
      .with_preference(GeometryPreference::PolygonFirst)
      .normalize_all(&[
        json!({"bbox": [1, 1, 20, 20]}),
        json!({"polygon": [[3, 3]]}),
        json!({"polygon": [[5, 5], [30, 5], [30, 30]], "label": "ear"}),
      ]);
    let outcomes = output.draw_polygons(&mut overlay, &detections);
    assert_eq!(
      outcomes,
      vec![
        DrawOutcome::Skipped(SkipReason::NotPolygon),
        DrawOutcome::Drawn,
        DrawOutcome::Drawn,
      ]
    );
  }

  #[test]
  fn polygon_is_filled_translucent_and_outlined_opaque() {
    let dir = std::env::temp_dir().join(format!("agriscan-poly-{}", std::process::id()));
    let path = dir.join("overlay.png");
    let output = output(path.clone());
    let image = RgbImage::new(100, 100);
    let raws = vec![json!({
      "polygon": [[20, 20], [80, 20], [80, 80], [20, 80]],
      "bbox": [0, 0, 99, 99],
      "class_id": 0,
      "label": "corn"
    })];

    let rendered = output.render_result(&image, &raws).unwrap();
    assert_eq!((rendered.drawn, rendered.skipped), (1, 0));

    let saved = image::open(&path).unwrap().to_rgb8();
    let Rgb([r, g, b]) = class_color(&ClassKey::Index(0));
    assert_eq!(*saved.get_pixel(20, 50), Rgb([r, g, b]));
    let fill = saved.get_pixel(30, 70);
    assert_eq!(fill[0], ((r as u32 * 90 + 127) / 255) as u8);
    assert_eq!(*saved.get_pixel(5, 5), Rgb([0, 0, 0]));
    let _ = std::fs::remove_dir_all(dir);
  }

  #[test]
  fn far_off_vertex_is_clipped_not_traced() {
    let output = output(PathBuf::from("unused.png"));
    let mut overlay = RgbaImage::new(64, 64);
    let detections = Normalizer::new(64, 64)
      .with_preference(GeometryPreference::PolygonFirst)
      .normalize_all(&[
        json!({"polygon": [[0, 0], [2.0e9, 0], [0, 2.0e9]], "class_id": 3}),
        json!({"polygon": [[-2.0e9, -2.0e9], [-1.0e9, -2.0e9], [-1.0e9, -1.0e9]], "class_id": 4}),
      ]);

    let start = std::time::Instant::now();
    let outcomes = output.draw_polygons(&mut overlay, &detections);
    assert!(start.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(outcomes, vec![DrawOutcome::Drawn, DrawOutcome::Drawn]);

    let Rgb([r, g, b]) = class_color(&ClassKey::Index(3));
    assert_eq!(*overlay.get_pixel(0, 30), Rgba([r, g, b, 255]));
    assert_eq!(*overlay.get_pixel(30, 30), Rgba([r, g, b, output.draw.fill_alpha()]));
  }
}
