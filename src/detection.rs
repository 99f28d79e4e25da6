// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/detection.rs - 检测结果归一化
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

use serde_json::{Map, Value};
use tracing::debug;

/// 未提供标签时使用的默认标签
pub const DEFAULT_LABEL: &str = "object";

const LABEL_KEYS: [&str; 4] = ["class", "class_name", "label", "name"];

/// 归一化后的几何形状，每个检测只携带一种
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
  /// 像素坐标 [x_min, y_min, x_max, y_max]，已裁剪到图像范围内
  Box([f64; 4]),
  /// 像素坐标下的顶点序列（多环多边形已展开为一个点序列）
  Polygon(Vec<(f64, f64)>),
}

impl Geometry {
  /// 外接矩形 [x_min, y_min, x_max, y_max]
  pub fn bounds(&self) -> [f64; 4] {
    match self {
      Geometry::Box(bbox) => *bbox,
      Geometry::Polygon(points) => points.iter().fold(
        [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
        |[x1, y1, x2, y2], &(x, y)| [x1.min(x), y1.min(y), x2.max(x), y2.max(y)],
      ),
    }
  }
}

/// 用于颜色分配的类别标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassKey {
  Index(i64),
  Name(String),
}

/// 一个归一化后的检测对象
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub geometry: Geometry,
  pub label: String,
  pub class_key: ClassKey,
  pub confidence: Option<f64>,
}

impl Detection {
  /// 标签文本，置信度可解析时附带两位小数
  pub fn caption(&self) -> String {
    match self.confidence {
      Some(score) => format!("{} {:.2}", self.label, score),
      None => self.label.clone(),
    }
  }
}

/// 几何形状解析顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryPreference {
  /// 先尝试矩形形式，再尝试多边形形式
  #[default]
  BoxFirst,
  /// 先尝试多边形形式，用于多边形叠加渲染
  PolygonFirst,
}

/// 单次解析尝试的结果
#[derive(Debug, Clone, PartialEq)]
enum Parsed<T> {
  /// 对应的键不存在，继续尝试下一种形式
  Absent,
  /// 键存在但内容不合法，整个检测被丢弃
  Invalid,
  Found(T),
}

impl<T> Parsed<T> {
  fn or_else(self, next: impl FnOnce() -> Parsed<T>) -> Parsed<T> {
    match self {
      Parsed::Absent => next(),
      other => other,
    }
  }

  fn and_then<U>(self, f: impl FnOnce(T) -> Parsed<U>) -> Parsed<U> {
    match self {
      Parsed::Found(value) => f(value),
      Parsed::Absent => Parsed::Absent,
      Parsed::Invalid => Parsed::Invalid,
    }
  }

  fn found(self) -> Option<T> {
    match self {
      Parsed::Found(value) => Some(value),
      _ => None,
    }
  }
}

/// 检测结果归一化器，绑定一张图像的尺寸
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
  width: u32,
  height: u32,
  bounded: bool,
  preference: GeometryPreference,
}

impl Normalizer {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      bounded: true,
      preference: GeometryPreference::default(),
    }
  }

  /// 图像尺寸未知时使用，矩形不做裁剪，只保留标签统计所需的信息
  pub fn unbounded() -> Self {
    Self {
      bounded: false,
      ..Self::new(0, 0)
    }
  }

  pub fn with_preference(mut self, preference: GeometryPreference) -> Self {
    self.preference = preference;
    self
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  /// 归一化一个原始检测，无法识别时返回 None
  pub fn normalize(&self, raw: &Value) -> Option<Detection> {
    let obj = raw.as_object()?;

    let geometry = match self.preference {
      GeometryPreference::BoxFirst => self
        .box_geometry(obj)
        .or_else(|| self.polygon_geometry(obj)),
      GeometryPreference::PolygonFirst => self
        .polygon_geometry(obj)
        .or_else(|| self.box_geometry(obj)),
    }
    .found()?;

    let class_id = obj.get("class_id").and_then(integer);
    let label_value = LABEL_KEYS
      .iter()
      .filter_map(|key| obj.get(*key))
      .find(|value| match value {
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
        _ => false,
      });

    let label = match (label_value, class_id) {
      (Some(Value::String(s)), _) => s.clone(),
      (Some(value), _) => value.to_string(),
      (None, Some(id)) => id.to_string(),
      (None, None) => DEFAULT_LABEL.to_string(),
    };

    let class_key = match (class_id, label_value.and_then(integer)) {
      (Some(id), _) | (None, Some(id)) => ClassKey::Index(id),
      (None, None) => ClassKey::Name(label.clone()),
    };

    Some(Detection {
      geometry,
      label,
      class_key,
      confidence: obj.get("confidence").and_then(lenient_number),
    })
  }

  /// 归一化一组检测，丢弃无法识别的项
  pub fn normalize_all(&self, raws: &[Value]) -> Vec<Detection> {
    raws
      .iter()
      .enumerate()
      .filter_map(|(index, raw)| {
        let detection = self.normalize(raw);
        if detection.is_none() {
          debug!("丢弃第 {} 个检测：无法识别的几何形状", index);
        }
        detection
      })
      .collect()
  }

  fn box_geometry(&self, obj: &Map<String, Value>) -> Parsed<Geometry> {
    corner_array(obj)
      .or_else(|| corner_fields(obj))
      .or_else(|| center_fields(obj))
      .and_then(|bbox| match self.clamp_box(bbox) {
        Some(bbox) => Parsed::Found(Geometry::Box(bbox)),
        None => Parsed::Invalid,
      })
  }

  fn polygon_geometry(&self, obj: &Map<String, Value>) -> Parsed<Geometry> {
    polygon_rings(obj)
      .or_else(|| {
        present_polygon(obj, "polygon_normalized").and_then(|value| {
          match ring(value) {
            Some(points) => Parsed::Found(
              points
                .into_iter()
                .map(|(x, y)| (x * self.width as f64, y * self.height as f64))
                .collect(),
            ),
            None => Parsed::Invalid,
          }
        })
      })
      .and_then(|points| Parsed::Found(Geometry::Polygon(points)))
  }

  /// 将矩形裁剪到 [0, width-1] × [0, height-1]，退化时返回 None
  fn clamp_box(&self, [x1, y1, x2, y2]: [f64; 4]) -> Option<[f64; 4]> {
    if !self.bounded {
      return (x2 > x1 && y2 > y1).then_some([x1, y1, x2, y2]);
    }
    if self.width == 0 || self.height == 0 {
      return None;
    }
    let max_x = (self.width - 1) as f64;
    let max_y = (self.height - 1) as f64;

    let x1 = x1.clamp(0.0, max_x);
    let y1 = y1.clamp(0.0, max_y);
    let x2 = x2.clamp(0.0, max_x);
    let y2 = y2.clamp(0.0, max_y);

    if x2 - x1 <= 0.0 || y2 - y1 <= 0.0 {
      return None;
    }
    Some([x1, y1, x2, y2])
  }
}

/// 从推理服务的响应中取出检测列表
///
/// 支持裸数组，或带有 `predictions` / `detections` 数组的对象。
pub fn extract_predictions(payload: &Value) -> Vec<Value> {
  match payload {
    Value::Array(items) => items.clone(),
    Value::Object(obj) => ["predictions", "detections"]
      .iter()
      .find_map(|key| obj.get(*key).and_then(Value::as_array))
      .cloned()
      .unwrap_or_default(),
    _ => Vec::new(),
  }
}

fn present<'v>(obj: &'v Map<String, Value>, key: &str) -> Option<&'v Value> {
  obj.get(key).filter(|value| !value.is_null())
}

fn present_polygon<'v>(obj: &'v Map<String, Value>, key: &str) -> Parsed<&'v Value> {
  match present(obj, key) {
    Some(Value::Array(items)) if items.is_empty() => Parsed::Absent,
    Some(value) => Parsed::Found(value),
    None => Parsed::Absent,
  }
}

// (1) bbox: [x1, y1, x2, y2]
fn corner_array(obj: &Map<String, Value>) -> Parsed<[f64; 4]> {
  let Some(value) = present(obj, "bbox") else {
    return Parsed::Absent;
  };
  let Some(items) = value.as_array().filter(|items| items.len() == 4) else {
    return Parsed::Invalid;
  };
  let mut bbox = [0.0; 4];
  for (slot, item) in bbox.iter_mut().zip(items) {
    match strict_number(item) {
      Some(v) => *slot = v,
      None => return Parsed::Invalid,
    }
  }
  Parsed::Found(bbox)
}

fn numeric_fields<const N: usize>(obj: &Map<String, Value>, keys: [&str; N]) -> Parsed<[f64; N]> {
  if keys.iter().all(|key| present(obj, key).is_none()) {
    return Parsed::Absent;
  }
  let mut values = [0.0; N];
  for (slot, key) in values.iter_mut().zip(keys) {
    match present(obj, key).and_then(lenient_number) {
      Some(v) => *slot = v,
      None => return Parsed::Invalid,
    }
  }
  Parsed::Found(values)
}

// (2) x1, y1, x2, y2
fn corner_fields(obj: &Map<String, Value>) -> Parsed<[f64; 4]> {
  numeric_fields(obj, ["x1", "y1", "x2", "y2"])
}

// (3) 中心点形式 x, y, width, height
fn center_fields(obj: &Map<String, Value>) -> Parsed<[f64; 4]> {
  numeric_fields(obj, ["x", "y", "width", "height"]).and_then(|[x, y, w, h]| {
    Parsed::Found([x - w / 2.0, y - h / 2.0, x + w / 2.0, y + h / 2.0])
  })
}

// (4) 单环多边形 / (5) 多环多边形
fn polygon_rings(obj: &Map<String, Value>) -> Parsed<Vec<(f64, f64)>> {
  present_polygon(obj, "polygon").and_then(|value| {
    let Some(items) = value.as_array() else {
      return Parsed::Invalid;
    };
    let single = items.first().and_then(point).is_some();
    let flattened = if single {
      ring(value)
    } else {
      items.iter().try_fold(Vec::new(), |mut acc, item| {
        acc.extend(ring(item)?);
        Some(acc)
      })
    };
    match flattened {
      Some(points) if !points.is_empty() => Parsed::Found(points),
      _ => Parsed::Invalid,
    }
  })
}

fn ring(value: &Value) -> Option<Vec<(f64, f64)>> {
  value.as_array()?.iter().map(point).collect()
}

fn point(value: &Value) -> Option<(f64, f64)> {
  match value.as_array()?.as_slice() {
    [x, y] => Some((strict_number(x)?, strict_number(y)?)),
    _ => None,
  }
}

fn strict_number(value: &Value) -> Option<f64> {
  value.as_f64().filter(|v| v.is_finite())
}

/// 数字或可解析为浮点数的字符串
pub(crate) fn lenient_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
  .filter(|v| v.is_finite())
}

fn integer(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn normalize(raw: Value) -> Option<Detection> {
    Normalizer::new(100, 100).normalize(&raw)
  }

  #[test]
  fn corner_array_is_parsed_and_clamped() {
    let det = normalize(json!({"bbox": [-5, 10, 150, 60], "class_name": "corn"})).unwrap();
    assert_eq!(det.geometry, Geometry::Box([0.0, 10.0, 99.0, 60.0]));
    assert_eq!(det.label, "corn");
    assert_eq!(det.class_key, ClassKey::Name("corn".into()));
  }

  #[test]
  fn separate_fields_accept_numeric_strings() {
    let det = normalize(json!({"x1": "10", "y1": 20, "x2": 30.5, "y2": "40"})).unwrap();
    assert_eq!(det.geometry, Geometry::Box([10.0, 20.0, 30.5, 40.0]));
    assert_eq!(det.label, DEFAULT_LABEL);
  }

  #[test]
  fn center_form_is_converted_to_corners() {
    let det = normalize(json!({"x": 50, "y": 40, "width": 20, "height": 10, "class": "ear"})).unwrap();
    assert_eq!(det.geometry, Geometry::Box([40.0, 35.0, 60.0, 45.0]));
  }

  #[test]
  fn corner_array_wins_over_other_forms() {
    let det = normalize(json!({
      "bbox": [1, 2, 3, 4],
      "x": 50, "y": 50, "width": 10, "height": 10,
      "polygon": [[0, 0], [10, 0], [10, 10]]
    }))
    .unwrap();
    assert_eq!(det.geometry, Geometry::Box([1.0, 2.0, 3.0, 4.0]));
  }

  #[test]
  fn malformed_inputs_are_rejected() {
    assert!(normalize(json!({"bbox": [10, "x", 50, 50], "label": "corn"})).is_none());
    assert!(normalize(json!({"bbox": [10, 10, 50]})).is_none());
    assert!(normalize(json!({"x1": 1, "y1": 2, "x2": 3})).is_none());
    assert!(normalize(json!({"x": 1, "y": 2, "width": "wide", "height": 3})).is_none());
    assert!(normalize(json!({"bbox": [true, 1, 2, 3]})).is_none());
    assert!(normalize(json!({"label": "corn"})).is_none());
    assert!(normalize(json!("not an object")).is_none());
  }

  #[test]
  fn degenerate_boxes_are_rejected() {
    assert!(normalize(json!({"bbox": [50, 50, 50, 60]})).is_none());
    assert!(normalize(json!({"bbox": [60, 10, 40, 20]})).is_none());
    assert!(normalize(json!({"bbox": [120, 10, 140, 20]})).is_none());
  }

  #[test]
  fn null_box_falls_through_to_polygon() {
    let det = normalize(json!({
      "bbox": null,
      "polygon": [[10, 10], [20, 10], [20, 20]],
      "class_id": 3,
      "class_name": "cob"
    }))
    .unwrap();
    assert_eq!(
      det.geometry,
      Geometry::Polygon(vec![(10.0, 10.0), (20.0, 10.0), (20.0, 20.0)])
    );
    assert_eq!(det.class_key, ClassKey::Index(3));
  }

  #[test]
  fn nested_rings_are_flattened() {
    let det = normalize(json!({
      "polygon": [[[0, 0], [4, 0], [4, 4]], [[10, 10], [12, 10]]]
    }))
    .unwrap();
    match det.geometry {
      Geometry::Polygon(points) => assert_eq!(points.len(), 5),
      other => panic!("unexpected geometry {other:?}"),
    }
  }

  #[test]
  fn malformed_polygon_point_rejects_detection() {
    assert!(normalize(json!({"polygon": [[0, 0], [4, "a"], [4, 4]]})).is_none());
    assert!(normalize(json!({"polygon": [[0, 0, 1]]})).is_none());
  }

  #[test]
  fn normalized_polygon_is_scaled() {
    let det = Normalizer::new(200, 100)
      .normalize(&json!({"polygon": [], "polygon_normalized": [[0.25, 0.5], [0.75, 0.5], [0.5, 0.75]]}))
      .unwrap();
    assert_eq!(
      det.geometry,
      Geometry::Polygon(vec![(50.0, 50.0), (150.0, 50.0), (100.0, 75.0)])
    );
  }

  #[test]
  fn polygon_preference_picks_polygon_first() {
    let raw = json!({"bbox": [0, 0, 30, 30], "polygon": [[1, 1], [5, 1], [5, 5]]});
    let det = Normalizer::new(100, 100)
      .with_preference(GeometryPreference::PolygonFirst)
      .normalize(&raw)
      .unwrap();
    assert!(matches!(det.geometry, Geometry::Polygon(_)));
  }

  #[test]
  fn label_and_confidence_fallbacks() {
    let det = normalize(json!({"bbox": [0, 0, 5, 5], "class_id": 7, "confidence": "0.5"})).unwrap();
    assert_eq!(det.label, "7");
    assert_eq!(det.confidence, Some(0.5));
    assert_eq!(det.caption(), "7 0.50");

    let det = normalize(json!({"bbox": [0, 0, 5, 5], "label": "corn", "confidence": "high"})).unwrap();
    assert_eq!(det.confidence, None);
    assert_eq!(det.caption(), "corn");
  }

  #[test]
  fn polygon_bounds() {
    let geometry = Geometry::Polygon(vec![(3.0, 8.0), (1.0, 2.0), (6.0, 4.0)]);
    assert_eq!(geometry.bounds(), [1.0, 2.0, 6.0, 8.0]);
  }

  #[test]
  fn predictions_are_extracted_from_envelopes() {
    assert_eq!(extract_predictions(&json!([{"a": 1}])).len(), 1);
    assert_eq!(extract_predictions(&json!({"predictions": [{}, {}]})).len(), 2);
    assert_eq!(extract_predictions(&json!({"detections": [{}]})).len(), 1);
    assert!(extract_predictions(&json!({"predictions": "none"})).is_empty());
    assert!(extract_predictions(&json!(3)).is_empty());
  }

  #[test]
  fn unbounded_normalizer_keeps_boxes_unclamped() {
    let normalizer = Normalizer::unbounded();
    let det = normalizer
      .normalize(&json!({"bbox": [10, 10, 5000, 50], "label": "corn"}))
      .unwrap();
    assert_eq!(det.geometry, Geometry::Box([10.0, 10.0, 5000.0, 50.0]));
    assert!(normalizer.normalize(&json!({"bbox": [10, 10, 10, 50]})).is_none());
    assert!(normalizer.normalize(&json!({"bbox": [10, "x", 20, 50]})).is_none());
  }
}
