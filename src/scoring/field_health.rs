// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/scoring/field_health.rs - 病害存在度与田间健康建议
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

use serde::{Deserialize, Serialize};

use crate::detection::Detection;

const DISEASE_KEYWORDS: [&str; 8] = [
  "disease", "blight", "rust", "mold", "rot", "wilt", "pest", "infect",
];

const NO_DISEASE: &str = "No disease indicators were found in this scan. Maintain regular scouting \
  and record keeping, keep irrigation and fertilization on schedule, and avoid unnecessary chemical \
  applications.";
const MILD_DISEASE: &str = "Early or mild disease pressure detected. Mark the affected spots from \
  the scan, scout those rows on the ground, and consider targeted treatment only in hotspots. \
  Monitor these areas over the next 3–7 days.";
const MODERATE_DISEASE: &str = "Moderate disease presence detected. Prioritise treatment of the \
  affected blocks, following local agronomy or extension guidelines for product choice and rates. \
  Improve airflow in the canopy where possible and avoid prolonged leaf wetness from irrigation.";
const SEVERE_DISEASE: &str = "Severe disease indicators detected in this frame. Consult an \
  agronomist or local extension officer as soon as possible, plan immediate treatment for the worst \
  areas, and review crop rotation, residue management, and variety selection for future seasons.";

/// 病害存在度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldHealth {
  pub field_health_percent: u8,
  pub disease_count: usize,
  pub total_detections: usize,
  pub recommendation: String,
}

/// 按病害关键词计算田间健康度，无检测时视为完全健康
pub fn field_health(detections: &[Detection]) -> FieldHealth {
  let total = detections.len();
  let disease_count = detections
    .iter()
    .filter(|detection| {
      let label = detection.label.to_lowercase();
      DISEASE_KEYWORDS.iter().any(|keyword| label.contains(keyword))
    })
    .count();

  let field_health_percent = if total == 0 {
    100
  } else {
    100 - super::percent(disease_count, total)
  };

  let recommendation = match (disease_count, field_health_percent) {
    (0, _) => NO_DISEASE,
    (_, 70..) => MILD_DISEASE,
    (_, 40..70) => MODERATE_DISEASE,
    _ => SEVERE_DISEASE,
  };

  FieldHealth {
    field_health_percent,
    disease_count,
    total_detections: total,
    recommendation: recommendation.to_string(),
  }
}
