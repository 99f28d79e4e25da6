// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/scoring.rs - 产量与健康指数估算
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

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detection::Detection;

mod color_analysis;
mod field_health;

pub use self::color_analysis::{PixelClass, PixelCounts, classify_hsv, count_pixels};
pub use self::field_health::{FieldHealth, field_health};

const KERNEL_KEYWORDS: [&str; 5] = ["ear", "cob", "kernel", "corn", "maize"];
const DISCOLOR_KEYWORDS: [&str; 8] = [
  "discolor",
  "yellow",
  "chlorosis",
  "spot",
  "blight",
  "rust",
  "lesion",
  "mold",
];
const DRYNESS_KEYWORDS: [&str; 8] = [
  "dry",
  "dryness",
  "wilt",
  "wilting",
  "drought",
  "senescent",
  "dead leaf",
  "necrosis",
];

const EMPTY_SUMMARY: &str = "No plants or ears were confidently detected in this frame, so yield \
  cannot be estimated from this image alone.";
const HIGH_GUIDANCE: &str = "Plants in this frame appear generally healthy with good kernel \
  development. Maintain current management and monitor for emerging stress.";
const MODERATE_GUIDANCE: &str = "There is a mix of healthy and stressed plants. Targeted nutrient \
  or pest management could help protect final yield.";
const LOW_GUIDANCE: &str = "Stress indicators and limited kernel development suggest yield may be \
  constrained in this area. Consider focused scouting and intervention.";

/// 产量潜力等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YieldLevel {
  High,
  Moderate,
  Low,
}

impl YieldLevel {
  pub fn from_index(overall: u8) -> Self {
    match overall {
      80.. => YieldLevel::High,
      50..80 => YieldLevel::Moderate,
      _ => YieldLevel::Low,
    }
  }

  pub fn guidance(&self) -> &'static str {
    match self {
      YieldLevel::High => HIGH_GUIDANCE,
      YieldLevel::Moderate => MODERATE_GUIDANCE,
      YieldLevel::Low => LOW_GUIDANCE,
    }
  }
}

impl fmt::Display for YieldLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      YieldLevel::High => "high",
      YieldLevel::Moderate => "moderate",
      YieldLevel::Low => "low",
    };
    f.write_str(name)
  }
}

/// 按标签关键词统计的检测数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionCounts {
  pub total_detections: usize,
  pub kernel_like: usize,
  pub discoloration_like: usize,
  pub dryness_like: usize,
}

impl DetectionCounts {
  pub fn from_detections(detections: &[Detection]) -> Self {
    let mut counts = DetectionCounts {
      total_detections: detections.len(),
      ..Default::default()
    };
    for detection in detections {
      let label = detection.label.to_lowercase();
      if label.is_empty() {
        continue;
      }
      counts.kernel_like += matches_any(&label, &KERNEL_KEYWORDS) as usize;
      counts.discoloration_like += matches_any(&label, &DISCOLOR_KEYWORDS) as usize;
      counts.dryness_like += matches_any(&label, &DRYNESS_KEYWORDS) as usize;
    }
    counts
  }

  /// 有籽粒类检测时取其数量，否则将未受胁迫的检测都视为籽粒类
  pub fn effective_kernel(&self) -> usize {
    if self.kernel_like > 0 {
      self.kernel_like
    } else {
      self
        .total_detections
        .saturating_sub(self.discoloration_like + self.dryness_like)
    }
  }
}

fn matches_any(label: &str, keywords: &[&str]) -> bool {
  keywords.iter().any(|keyword| label.contains(keyword))
}

/// 产量估算结果，各指数取值 0-100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldEstimate {
  pub kernel_development_score: u8,
  pub discoloration_index: u8,
  pub leaf_dryness_index: u8,
  pub overall_yield_index: u8,
  pub level: YieldLevel,
  pub summary: String,
  pub counts: DetectionCounts,
}

impl YieldEstimate {
  /// 无检测时的结果
  pub fn empty() -> Self {
    Self {
      kernel_development_score: 0,
      discoloration_index: 0,
      leaf_dryness_index: 0,
      overall_yield_index: 0,
      level: YieldLevel::Low,
      summary: EMPTY_SUMMARY.to_string(),
      counts: DetectionCounts::default(),
    }
  }

  fn from_indices(kernel: u8, discoloration: u8, dryness: u8, counts: DetectionCounts) -> Self {
    let overall = overall_yield_index(kernel, discoloration, dryness);
    let level = YieldLevel::from_index(overall);
    let summary = format!(
      "Estimated {} yield potential from this frame. Kernel development score: {}%, \
       discoloration index: {}%, leaf dryness index: {}%. {}",
      level,
      kernel,
      discoloration,
      dryness,
      level.guidance()
    );

    Self {
      kernel_development_score: kernel,
      discoloration_index: discoloration,
      leaf_dryness_index: dryness,
      overall_yield_index: overall,
      level,
      summary,
      counts,
    }
  }
}

/// round(100 × num / denom)，结果裁剪到 [0, 100]
pub fn percent(num: usize, denom: usize) -> u8 {
  if denom == 0 {
    return 0;
  }
  (100.0 * num as f64 / denom as f64)
    .round_ties_even()
    .clamp(0.0, 100.0) as u8
}

/// 综合产量指数：籽粒得分按胁迫比例折减
pub fn overall_yield_index(kernel: u8, discoloration: u8, dryness: u8) -> u8 {
  let stress_ratio = ((discoloration as f64 + dryness as f64) / 200.0).clamp(0.0, 1.0);
  (kernel as f64 * (1.0 - stress_ratio))
    .round_ties_even()
    .clamp(0.0, 100.0) as u8
}

/// 产量与健康估算器
#[derive(Debug, Clone, Copy)]
pub struct YieldScorer {
  analysis_size: u32,
}

impl YieldScorer {
  pub fn new(analysis_size: u32) -> Self {
    Self {
      analysis_size: analysis_size.max(1),
    }
  }

  /// 仅按标签关键词估算
  pub fn estimate_from_labels(&self, detections: &[Detection]) -> YieldEstimate {
    self.estimate(detections, None)
  }

  /// 估算产量指数，提供图像时用检测区域的像素颜色覆盖标签结果
  pub fn estimate(&self, detections: &[Detection], image: Option<&RgbImage>) -> YieldEstimate {
    let counts = DetectionCounts::from_detections(detections);
    if counts.total_detections == 0 {
      return YieldEstimate::empty();
    }

    let total = counts.total_detections;
    let mut kernel = percent(counts.effective_kernel(), total);
    let mut discoloration = percent(counts.discoloration_like, total);
    let mut dryness = percent(counts.dryness_like, total);

    if let Some(pixels) = image.and_then(|image| count_pixels(image, detections, self.analysis_size))
    {
      debug!(
        "颜色分析: 绿 {} / 黄 {} / 褐 {}",
        pixels.green, pixels.yellow, pixels.brown
      );
      let total_px = pixels.total();
      kernel = percent(pixels.green, total_px);
      discoloration = percent(pixels.yellow, total_px);
      dryness = percent(pixels.brown, total_px);
    }

    YieldEstimate::from_indices(kernel, discoloration, dryness, counts)
  }
}
