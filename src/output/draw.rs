// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{ImageBuffer, Pixel};
use imageproc::drawing::{
  draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::config::DrawConfig;

// 内置字体（DejaVu Sans）
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

// 无法测量文本时的字符宽度估计（相对字号）
const FALLBACK_CHAR_WIDTH_RATIO: f32 = 0.6;

/// 单个检测的绘制结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
  Drawn,
  Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  /// 裁剪后宽或高不为正
  Degenerate,
  /// 检测不携带多边形
  NotPolygon,
  /// 去重后顶点不足以构成多边形
  TooFewPoints,
}

/// 标注绘制工具
pub struct Draw {
  font: Option<FontArc>,
  scale: PxScale,
  line_width: u32,
  padding: i32,
  fill_alpha: u8,
  label_alpha: u8,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(&DrawConfig::default())
  }
}

impl Draw {
  pub fn new(config: &DrawConfig) -> Self {
    let font = config
      .font_path
      .as_deref()
      .and_then(load_font)
      .or_else(embedded_font);

    Self {
      font,
      scale: PxScale::from(config.font_size),
      line_width: config.line_width.max(1),
      padding: config.label_padding.max(0),
      fill_alpha: config.polygon_fill_alpha,
      label_alpha: config.polygon_label_alpha,
    }
  }

  /// 不加载字体，标签按估算尺寸只绘制背景
  #[cfg(test)]
  pub(crate) fn without_font(mut self) -> Self {
    self.font = None;
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn padding(&self) -> i32 {
    self.padding
  }

  pub fn fill_alpha(&self) -> u8 {
    self.fill_alpha
  }

  pub fn label_alpha(&self) -> u8 {
    self.label_alpha
  }

  /// 测量文本尺寸，字体不可用或测量结果为空时按字符数估算
  pub fn text_extent(&self, text: &str) -> (i32, i32) {
    let measured = self
      .font
      .as_ref()
      .map(|font| text_size(self.scale, font, text))
      .filter(|(w, h)| (*w > 0 && *h > 0) || text.is_empty());

    match measured {
      Some((w, h)) => (w as i32, h as i32),
      None => (
        (text.chars().count() as f32 * self.scale.x * FALLBACK_CHAR_WIDTH_RATIO).ceil() as i32,
        self.scale.y.ceil() as i32,
      ),
    }
  }

  /// 绘制向内加粗的矩形边框，坐标为闭区间
  pub fn draw_thick_rect<P>(
    &self,
    canvas: &mut ImageBuffer<P, Vec<u8>>,
    [x1, y1, x2, y2]: [i32; 4],
    color: P,
  ) where
    P: Pixel<Subpixel = u8>,
  {
    for t in 0..self.line_width as i32 {
      let (w, h) = (x2 - x1 + 1 - 2 * t, y2 - y1 + 1 - 2 * t);
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(canvas, rect, color);
    }
  }

  /// 绘制闭合折线，只绘制落在画布（按线宽外扩）内的部分
  pub fn draw_closed_outline<P>(
    &self,
    canvas: &mut ImageBuffer<P, Vec<u8>>,
    points: &[(f64, f64)],
    color: P,
  ) where
    P: Pixel<Subpixel = u8>,
  {
    if points.len() < 2 {
      return;
    }
    let margin = self.line_width as f64;
    let bounds = [
      -margin,
      -margin,
      canvas.width() as f64 - 1.0 + margin,
      canvas.height() as f64 - 1.0 + margin,
    ];
    let half = (self.line_width / 2) as i32;
    let next = points.iter().cycle().skip(1);
    for (&a, &b) in points.iter().zip(next) {
      let Some(((ax, ay), (bx, by))) = clip_segment(a, b, bounds) else {
        continue;
      };
      let (ax, ay, bx, by) = (ax as f32, ay as f32, bx as f32, by as f32);
      for dy in -half..=half {
        for dx in -half..=half {
          let (dx, dy) = (dx as f32, dy as f32);
          draw_line_segment_mut(canvas, (ax + dx, ay + dy), (bx + dx, by + dy), color);
        }
      }
    }
  }

  /// 在 [x0, y0, x1, y1) 范围内绘制标签背景，并在内边距处绘制文本
  pub fn draw_label<P>(
    &self,
    canvas: &mut ImageBuffer<P, Vec<u8>>,
    [x0, y0, x1, y1]: [i32; 4],
    text: &str,
    background: P,
    foreground: P,
  ) where
    P: Pixel<Subpixel = u8>,
  {
    if x1 <= x0 || y1 <= y0 {
      debug!("标签 '{}' 没有可用空间", text);
      return;
    }
    let rect = Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(canvas, rect, background);

    if let Some(font) = &self.font {
      draw_text_mut(
        canvas,
        foreground,
        x0 + self.padding,
        y0 + self.padding,
        self.scale,
        font,
        text,
      );
    }
  }
}

/// Liang-Barsky 线段裁剪，返回线段落在 [x_min, y_min, x_max, y_max] 内的部分
pub fn clip_segment(
  (ax, ay): (f64, f64),
  (bx, by): (f64, f64),
  [x_min, y_min, x_max, y_max]: [f64; 4],
) -> Option<((f64, f64), (f64, f64))> {
  let (dx, dy) = (bx - ax, by - ay);
  let (mut t0, mut t1) = (0.0f64, 1.0f64);
  for (p, q) in [
    (-dx, ax - x_min),
    (dx, x_max - ax),
    (-dy, ay - y_min),
    (dy, y_max - ay),
  ] {
    if p == 0.0 {
      if q < 0.0 {
        return None;
      }
      continue;
    }
    let r = q / p;
    if p < 0.0 {
      if r > t1 {
        return None;
      }
      t0 = t0.max(r);
    } else {
      if r < t0 {
        return None;
      }
      t1 = t1.min(r);
    }
  }
  Some((
    (ax + t0 * dx, ay + t0 * dy),
    (ax + t1 * dx, ay + t1 * dy),
  ))
}

/// Sutherland-Hodgman 多边形裁剪，结果顶点均落在 [x_min, y_min, x_max, y_max] 内
pub fn clip_polygon(points: &[(f64, f64)], [x_min, y_min, x_max, y_max]: [f64; 4]) -> Vec<(f64, f64)> {
  let clipped = clip_half_plane(points, Axis::X, x_min, true);
  let clipped = clip_half_plane(&clipped, Axis::X, x_max, false);
  let clipped = clip_half_plane(&clipped, Axis::Y, y_min, true);
  clip_half_plane(&clipped, Axis::Y, y_max, false)
}

#[derive(Clone, Copy)]
enum Axis {
  X,
  Y,
}

fn clip_half_plane(points: &[(f64, f64)], axis: Axis, bound: f64, keep_above: bool) -> Vec<(f64, f64)> {
  let coord = |(x, y): (f64, f64)| match axis {
    Axis::X => x,
    Axis::Y => y,
  };
  let inside = |point: (f64, f64)| {
    if keep_above {
      coord(point) >= bound
    } else {
      coord(point) <= bound
    }
  };

  let mut result = Vec::with_capacity(points.len() + 2);
  for (index, &current) in points.iter().enumerate() {
    let previous = points[(index + points.len() - 1) % points.len()];
    if inside(current) != inside(previous) {
      let t = (bound - coord(previous)) / (coord(current) - coord(previous));
      result.push((
        previous.0 + t * (current.0 - previous.0),
        previous.1 + t * (current.1 - previous.1),
      ));
    }
    if inside(current) {
      result.push(current);
    }
  }
  result
}

fn embedded_font() -> Option<FontArc> {
  match FontArc::try_from_slice(EMBEDDED_FONT) {
    Ok(font) => Some(font),
    Err(err) => {
      warn!("无法解析内置字体，标签仅绘制背景: {}", err);
      None
    }
  }
}

fn load_font(path: &Path) -> Option<FontArc> {
  let data = match std::fs::read(path) {
    Ok(data) => data,
    Err(err) => {
      warn!("无法读取字体文件 {}: {}", path.display(), err);
      return None;
    }
  };
  match FontArc::try_from_vec(data) {
    Ok(font) => {
      debug!("加载字体: {}", path.display());
      Some(font)
    }
    Err(err) => {
      warn!("无法解析字体文件 {}: {}", path.display(), err);
      None
    }
  }
}

/// 输出文件路径，必要时创建父目录
pub fn prepare_output_path(path: &Path) -> std::io::Result<PathBuf> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(path.to_path_buf())
}
