// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/engine.rs - 单次扫描请求的处理流程
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

use std::path::PathBuf;
use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::area::{FieldArea, FieldAreaEstimator};
use crate::config::EngineConfig;
use crate::detection::{Normalizer, extract_predictions};
use crate::output::{OutputError, OutputWrapper, Render};
use crate::overlay::{OverlayBox, overlay_boxes};
use crate::scoring::{FieldHealth, YieldEstimate, YieldScorer, field_health};

/// 源图像，来自文件或内存中的编码数据
#[derive(Debug, Clone)]
pub enum SourceImage {
  Path(PathBuf),
  Bytes(Vec<u8>),
}

impl SourceImage {
  fn load(&self) -> image::ImageResult<RgbImage> {
    let decoded = match self {
      SourceImage::Path(path) => image::open(path),
      SourceImage::Bytes(bytes) => image::load_from_memory(bytes),
    };
    decoded.map(|image| image.to_rgb8())
  }

  fn describe(&self) -> String {
    match self {
      SourceImage::Path(path) => path.display().to_string(),
      SourceImage::Bytes(bytes) => format!("<{} 字节>", bytes.len()),
    }
  }
}

/// 一次扫描请求
#[derive(Debug, Clone)]
pub struct ScanRequest {
  pub image: SourceImage,
  /// 推理服务返回的原始检测
  pub detections: Vec<Value>,
  /// 飞行高度（米）
  pub altitude_m: Option<f64>,
  /// 标注图像输出位置
  pub output: Url,
}

impl ScanRequest {
  pub fn new(image: SourceImage, detections: Vec<Value>, output: Url) -> Self {
    Self {
      image,
      detections,
      altitude_m: None,
      output,
    }
  }

  /// 从推理服务的完整响应构造请求
  pub fn from_payload(image: SourceImage, payload: &Value, output: Url) -> Self {
    Self::new(image, extract_predictions(payload), output)
  }

  pub fn with_altitude(mut self, altitude_m: Option<f64>) -> Self {
    self.altitude_m = altitude_m;
    self
  }
}

/// 一次扫描的完整结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
  pub detections: Vec<OverlayBox>,
  pub yield_estimate: YieldEstimate,
  pub field_health: FieldHealth,
  pub field_area: Option<FieldArea>,
  pub annotated_image_path: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub annotation_error: Option<String>,
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
}

impl EngineError {
  /// 渲染依赖缺失
  pub fn is_unavailable(&self) -> bool {
    matches!(self, EngineError::Output(err) if err.is_unavailable())
  }
}

/// 扫描处理引擎，不持有跨请求的可变状态
#[derive(Debug, Clone)]
pub struct Engine {
  config: EngineConfig,
  scorer: YieldScorer,
  area: FieldAreaEstimator,
}

impl Default for Engine {
  fn default() -> Self {
    Self::new(EngineConfig::default())
  }
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self {
      scorer: YieldScorer::new(config.analysis_size),
      area: FieldAreaEstimator::new(config.camera.clone()),
      config,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// 处理一次扫描请求
  ///
  /// 仅在所选渲染器未编译进来时返回错误。源图像无法解码时退化为仅按标签估算的结果，
  /// 叠加框为空，错误信息记录在 `annotation_error` 中。
  pub fn process(&self, request: &ScanRequest) -> Result<ScanReport, EngineError> {
    info!("开始处理扫描请求...");
    let now = Instant::now();
    let output = match OutputWrapper::from_url_with_config(&request.output, &self.config.draw) {
      Err(err) if err.is_unavailable() => return Err(err.into()),
      other => other,
    };

    let image = match request.image.load() {
      Ok(image) => image,
      Err(err) => {
        warn!("无法加载源图像 {}: {}，仅按标签估算", request.image.describe(), err);
        return Ok(self.label_only_report(request, &err));
      }
    };
    let (width, height) = image.dimensions();
    info!("源图像加载成功 ({}x{})，耗时: {:.2?}", width, height, now.elapsed());

    let detections = Normalizer::new(width, height).normalize_all(&request.detections);
    debug!(
      "归一化得到 {} / {} 个检测",
      detections.len(),
      request.detections.len()
    );

    let overlay = overlay_boxes(width, height, &detections);
    let yield_estimate = self.scorer.estimate(&detections, Some(&image));
    let field_health = field_health(&detections);
    let field_area = self.area.estimate(width, height, request.altitude_m);
    if matches!(request.altitude_m, Some(altitude) if altitude > 0.0) && field_area.is_none() {
      warn!("飞行高度 {:?} 下无法估算面积", request.altitude_m);
    }
    info!("分析完成，耗时: {:.2?}", now.elapsed());

    let (annotated_image_path, annotation_error) =
      match output.and_then(|output| annotate(&output, &image, request)) {
        Ok(path) => (Some(path), None),
        Err(err) => {
          warn!("标注图像生成失败: {}", err);
          (None, Some(err.to_string()))
        }
      };
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(ScanReport {
      detections: overlay,
      yield_estimate,
      field_health,
      field_area,
      annotated_image_path,
      annotation_error,
    })
  }

  fn label_only_report(&self, request: &ScanRequest, err: &image::ImageError) -> ScanReport {
    let detections = Normalizer::unbounded().normalize_all(&request.detections);
    // 像素数据损坏时文件头可能仍然可读
    let field_area = match &request.image {
      SourceImage::Path(path) => self.area.estimate_from_path(path, request.altitude_m),
      SourceImage::Bytes(_) => None,
    };

    ScanReport {
      detections: Vec::new(),
      yield_estimate: self.scorer.estimate_from_labels(&detections),
      field_health: field_health(&detections),
      field_area,
      annotated_image_path: None,
      annotation_error: Some(format!(
        "无法加载源图像 {}: {}",
        request.image.describe(),
        err
      )),
    }
  }
}

fn annotate(
  output: &OutputWrapper,
  image: &RgbImage,
  request: &ScanRequest,
) -> Result<PathBuf, OutputError> {
  let rendered = output.render_result(image, &request.detections)?;
  debug!(
    "标注 {} 个检测，跳过 {} 个",
    rendered.drawn, rendered.skipped
  );
  Ok(rendered.path)
}
