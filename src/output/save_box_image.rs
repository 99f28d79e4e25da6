// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/output/save_box_image.rs - 矩形框标注图像输出
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

use image::{Rgb, RgbImage};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::color::class_color;
use crate::config::DrawConfig;
use crate::detection::{Detection, GeometryPreference, Normalizer};
use crate::output::draw::{Draw, DrawOutcome, SkipReason, prepare_output_path};
use crate::output::{BOX_IMAGE_SCHEME, OutputError, Render, RenderedImage, url_path};
use crate::{FromUrl, FromUrlWithScheme};

const LABEL_FOREGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// 在原图副本上绘制矩形框与标签并保存
pub struct SaveBoxImageOutput {
  path: PathBuf,
  draw: Draw,
}

impl FromUrlWithScheme for SaveBoxImageOutput {
  const SCHEME: &'static str = BOX_IMAGE_SCHEME;
}

impl FromUrl for SaveBoxImageOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_config(url, &DrawConfig::default())
  }
}

impl SaveBoxImageOutput {
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

  /// 在画布上绘制全部检测，返回每个检测的绘制结果
  pub fn draw_boxes(&self, canvas: &mut RgbImage, detections: &[Detection]) -> Vec<DrawOutcome> {
    detections
      .iter()
      .map(|detection| self.draw_one(canvas, detection))
      .collect()
  }

  fn draw_one(&self, canvas: &mut RgbImage, detection: &Detection) -> DrawOutcome {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    if width == 0 || height == 0 {
      return DrawOutcome::Skipped(SkipReason::Degenerate);
    }

    // 多边形按外接矩形绘制
    let [x1, y1, x2, y2] = detection.geometry.bounds();
    let clamp_x = |v: f64| (v as i32).clamp(0, width - 1);
    let clamp_y = |v: f64| (v as i32).clamp(0, height - 1);
    let (x1, y1, x2, y2) = (clamp_x(x1), clamp_y(y1), clamp_x(x2), clamp_y(y2));
    if x2 <= x1 || y2 <= y1 {
      debug!("跳过退化检测框: {}", detection.label);
      return DrawOutcome::Skipped(SkipReason::Degenerate);
    }

    let color = class_color(&detection.class_key);
    self.draw.draw_thick_rect(canvas, [x1, y1, x2, y2], color);

    let caption = detection.caption();
    let (text_w, text_h) = self.draw.text_extent(&caption);
    let pad = self.draw.padding();
    // 标签位于框左上角上方，贴近顶边时下移到图像内
    let tx0 = x1;
    let ty0 = (y1 - text_h - 2 * pad).max(0);
    let tx1 = (tx0 + text_w + 2 * pad).min(width);
    let ty1 = (ty0 + text_h + 2 * pad).min(height);
    self
      .draw
      .draw_label(canvas, [tx0, ty0, tx1, ty1], &caption, color, LABEL_FOREGROUND);

    DrawOutcome::Drawn
  }

  /// 归一化原始检测并渲染到指定路径，原图不被修改
  pub fn render_into(
    &self,
    image: &RgbImage,
    raws: &[Value],
    path: &Path,
  ) -> Result<RenderedImage, OutputError> {
    let start = Instant::now();
    let detections = Normalizer::new(image.width(), image.height())
      .with_preference(GeometryPreference::BoxFirst)
      .normalize_all(raws);

    let mut canvas = image.clone();
    let outcomes = self.draw_boxes(&mut canvas, &detections);
    let drawn = outcomes
      .iter()
      .filter(|outcome| **outcome == DrawOutcome::Drawn)
      .count();

    let path = prepare_output_path(path)?;
    canvas.save(&path)?;
    info!(
      "保存标注图像到文件: {} ({} 个检测, 用时 {:?})",
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

impl Render<RgbImage, [Value]> for SaveBoxImageOutput {
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

  fn output(path: PathBuf) -> SaveBoxImageOutput {
    SaveBoxImageOutput::new(path, Draw::default().without_font())
  }

  fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("agriscan-box-{}-{}", name, std::process::id()))
  }

  #[test]
  fn scheme_must_match() {
    let url = Url::parse("polygon:///tmp/out.jpg").unwrap();
    assert!(matches!(
      SaveBoxImageOutput::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
    let url = Url::parse("image:///tmp/agriscan/out.jpg").unwrap();
    let output = SaveBoxImageOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("/tmp/agriscan/out.jpg"));
  }

  #[test]
  fn outline_uses_class_color() {
    let output = output(PathBuf::from("unused.png"));
    let mut canvas = RgbImage::new(100, 100);
    let detections = Normalizer::new(100, 100)
      .normalize_all(&[json!({"bbox": [10, 40, 60, 90], "class_id": 0, "confidence": 0.9})]);
    let outcomes = output.draw_boxes(&mut canvas, &detections);
    assert_eq!(outcomes, vec![DrawOutcome::Drawn]);

    let color = class_color(&ClassKey::Index(0));
    assert_eq!(*canvas.get_pixel(10, 60), color);
    assert_eq!(*canvas.get_pixel(12, 60), color);
    assert_eq!(*canvas.get_pixel(13, 60), Rgb([0, 0, 0]));
    // 标签背景位于框上方
    assert_eq!(*canvas.get_pixel(11, 38), color);
  }

  #[test]
  fn label_stays_inside_when_box_touches_top() {
    let output = output(PathBuf::from("unused.png"));
    let mut canvas = RgbImage::new(80, 80);
    let detections =
      Normalizer::new(80, 80).normalize_all(&[json!({"bbox": [5, 0, 40, 30], "label": "corn"})]);
    output.draw_boxes(&mut canvas, &detections);
    let color = class_color(&ClassKey::Name("corn".to_string()));
    assert_eq!(*canvas.get_pixel(20, 10), color);
    assert_eq!(*canvas.get_pixel(20, 25), Rgb([0, 0, 0]));
  }

  #[test]
  fn renders_copy_and_counts_drops() {
    let dir = scratch_dir("render");
    let path = dir.join("nested").join("annotated.png");
    let output = output(path.clone());
    let image = RgbImage::from_pixel(64, 48, Rgb([30, 120, 30]));
    let raws = vec![
      json!({"bbox": [4, 20, 30, 40], "label": "corn", "confidence": 0.75}),
      json!({"bbox": [0, 0, 10, "x"], "label": "corn"}),
    ];

    let rendered = output.render_result(&image, &raws).unwrap();
    assert_eq!(rendered.path, path);
    assert_eq!((rendered.drawn, rendered.skipped), (1, 1));
    assert_eq!(*image.get_pixel(4, 30), Rgb([30, 120, 30]));

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (64, 48));
    assert_ne!(*saved.get_pixel(4, 30), Rgb([30, 120, 30]));
    let _ = std::fs::remove_dir_all(dir);
  }
}
