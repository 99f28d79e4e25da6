// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/area.rs - 针孔相机模型下的地面覆盖面积估算
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

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CameraConfig;

const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;
const SQUARE_METERS_PER_ACRE: f64 = 4_046.86;

/// 单张图像覆盖的地面范围
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldArea {
  pub altitude_m: f64,
  pub width_m: f64,
  pub height_m: f64,
  pub area_m2: f64,
  pub area_hectares: f64,
  pub area_acres: f64,
  pub camera_model: String,
  pub notes: String,
}

/// 地面面积估算器
///
/// 假设相机垂直向下拍摄，水平视场角固定，垂直视场角由图像宽高比推出。
#[derive(Debug, Clone)]
pub struct FieldAreaEstimator {
  camera: CameraConfig,
}

impl FieldAreaEstimator {
  pub fn new(camera: CameraConfig) -> Self {
    Self { camera }
  }

  /// 由图像尺寸和飞行高度估算，高度缺失或不为正时返回 None
  pub fn estimate(&self, width_px: u32, height_px: u32, altitude_m: Option<f64>) -> Option<FieldArea> {
    let altitude_m = altitude_m.filter(|a| a.is_finite() && *a > 0.0)?;
    if width_px == 0 || height_px == 0 {
      return None;
    }

    let hfov_half = self.camera.horizontal_fov_degrees.to_radians() / 2.0;
    let aspect_h_over_w = height_px as f64 / width_px as f64;
    let vfov_half = (hfov_half.tan() * aspect_h_over_w).atan();

    let width_m = 2.0 * altitude_m * hfov_half.tan();
    let height_m = 2.0 * altitude_m * vfov_half.tan();
    let area_m2 = width_m * height_m;
    if !area_m2.is_finite() || area_m2 <= 0.0 {
      warn!(
        "视场角 {}° 下无法得到有效面积",
        self.camera.horizontal_fov_degrees
      );
      return None;
    }

    Some(FieldArea {
      altitude_m,
      width_m,
      height_m,
      area_m2,
      area_hectares: area_m2 / SQUARE_METERS_PER_HECTARE,
      area_acres: area_m2 / SQUARE_METERS_PER_ACRE,
      camera_model: self.camera.camera_model_label.clone(),
      notes: format!(
        "Approximate area assuming ~{}° horizontal FOV and nadir view.",
        self.camera.horizontal_fov_degrees
      ),
    })
  }

  /// 读取图像文件头获取尺寸后估算，读取失败时返回 None
  pub fn estimate_from_path(&self, image_path: &Path, altitude_m: Option<f64>) -> Option<FieldArea> {
    altitude_m.filter(|a| *a > 0.0)?;
    match image::image_dimensions(image_path) {
      Ok((width, height)) => self.estimate(width, height, altitude_m),
      Err(err) => {
        warn!("无法读取图像尺寸 {}: {}", image_path.display(), err);
        None
      }
    }
  }
}
