// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/overlay.rs - 供客户端渲染的归一化叠加框
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

use crate::detection::{Detection, Geometry};

/// 与分辨率无关的检测框，坐标为图像宽高的比例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayBox {
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
  pub label: String,
  pub confidence: Option<f64>,
  /// 多边形检测的归一化顶点
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub polygon: Option<Vec<[f64; 2]>>,
}

/// 将检测转换为叠加框，丢弃宽或高不为正的项
pub fn overlay_boxes(width: u32, height: u32, detections: &[Detection]) -> Vec<OverlayBox> {
  if width == 0 || height == 0 {
    return Vec::new();
  }
  let (w, h) = (width as f64, height as f64);

  detections
    .iter()
    .filter_map(|detection| {
      let (bounds, polygon) = match &detection.geometry {
        // 矩形已由归一化器裁剪到 [0, width-1] × [0, height-1]
        Geometry::Box(bbox) => (*bbox, None),
        Geometry::Polygon(points) => {
          let normalized: Vec<[f64; 2]> = points
            .iter()
            .map(|&(x, y)| [(x / w).clamp(0.0, 1.0), (y / h).clamp(0.0, 1.0)])
            .collect();
          let [x1, y1, x2, y2] = detection.geometry.bounds();
          (
            [x1.clamp(0.0, w), y1.clamp(0.0, h), x2.clamp(0.0, w), y2.clamp(0.0, h)],
            Some(normalized),
          )
        }
      };

      let [x1, y1, x2, y2] = bounds;
      if x2 <= x1 || y2 <= y1 {
        return None;
      }

      Some(OverlayBox {
        x1: x1 / w,
        y1: y1 / h,
        x2: x2 / w,
        y2: y2 / h,
        label: detection.label.clone(),
        confidence: detection.confidence,
        polygon,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::Normalizer;
  use serde_json::json;

  #[test]
  fn boxes_are_normalized_by_image_size() {
    let detections = Normalizer::new(200, 100).normalize_all(&[
      json!({"bbox": [20, 10, 100, 50], "label": "corn", "confidence": 0.8}),
      json!({"bbox": [0, 0, 10, "x"], "label": "corn"}),
    ]);
    let boxes = overlay_boxes(200, 100, &detections);
    assert_eq!(boxes.len(), 1);
    let b = &boxes[0];
    assert_eq!((b.x1, b.y1, b.x2, b.y2), (0.1, 0.1, 0.5, 0.5));
    assert_eq!(b.label, "corn");
    assert_eq!(b.confidence, Some(0.8));
    assert!(b.polygon.is_none());
  }

  #[test]
  fn unparsable_confidence_is_null() {
    let detections = Normalizer::new(50, 50)
      .normalize_all(&[json!({"bbox": [1, 1, 10, 10], "confidence": "n/a"})]);
    let boxes = overlay_boxes(50, 50, &detections);
    assert_eq!(boxes[0].confidence, None);
    let value = serde_json::to_value(&boxes[0]).unwrap();
    assert!(value["confidence"].is_null());
    assert!(value.get("polygon").is_none());
  }

  #[test]
  fn degenerate_polygon_is_excluded() {
    let detections = Normalizer::new(50, 50)
      .normalize_all(&[json!({"polygon": [[5, 5], [5, 20], [5, 40]]})]);
    assert_eq!(detections.len(), 1);
    assert!(overlay_boxes(50, 50, &detections).is_empty());
  }

  #[test]
  fn normalized_polygon_round_trips() {
    let ring = [[0.125, 0.2], [0.6, 0.35], [0.45, 0.9], [0.1, 0.7]];
    let (width, height) = (640, 480);
    let detections = Normalizer::new(width, height)
      .normalize_all(&[json!({"polygon_normalized": ring, "class_name": "ear"})]);
    let boxes = overlay_boxes(width, height, &detections);
    assert_eq!(boxes.len(), 1);

    let polygon = boxes[0].polygon.as_ref().unwrap();
    for (got, want) in polygon.iter().zip(ring.iter()) {
      assert!((got[0] - want[0]).abs() < 1e-12);
      assert!((got[1] - want[1]).abs() < 1e-12);
    }
    assert!((boxes[0].x1 - 0.1).abs() < 1e-12);
    assert!((boxes[0].y1 - 0.2).abs() < 1e-12);
    assert!((boxes[0].x2 - 0.6).abs() < 1e-12);
    assert!((boxes[0].y2 - 0.9).abs() < 1e-12);
  }

  #[test]
  fn emitted_boxes_are_never_inverted() {
    let raws: Vec<_> = (0..40)
      .map(|i| json!({"bbox": [i * 7 - 30, i * 3 - 10, i * 11 - 50, i * 5 + 2]}))
      .collect();
    let detections = Normalizer::new(120, 90).normalize_all(&raws);
    for b in overlay_boxes(120, 90, &detections) {
      assert!(b.x2 > b.x1 && b.y2 > b.y1);
      assert!(b.x1 >= 0.0 && b.x2 <= 1.0 && b.y1 >= 0.0 && b.y2 <= 1.0);
    }
  }
}
