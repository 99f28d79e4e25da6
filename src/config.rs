// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/config.rs - 引擎配置
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

use serde::{Deserialize, Serialize};

// 相机默认参数
const DEFAULT_HORIZONTAL_FOV_DEGREES: f64 = 100.0;
const DEFAULT_CAMERA_MODEL_LABEL: &str = "LYZRC L200 (approximate)";

// 绘制默认参数
const DEFAULT_ANALYSIS_SIZE: u32 = 96;
const DEFAULT_POLYGON_FILL_ALPHA: u8 = 90;
const DEFAULT_POLYGON_LABEL_ALPHA: u8 = 220;
const DEFAULT_LINE_WIDTH: u32 = 3;
const DEFAULT_LABEL_PADDING: i32 = 3;
const DEFAULT_FONT_SIZE: f32 = 14.0;

/// 相机几何参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
  /// 水平视场角（度）
  pub horizontal_fov_degrees: f64,
  /// 报告中使用的相机型号说明
  pub camera_model_label: String,
}

impl Default for CameraConfig {
  fn default() -> Self {
    Self {
      horizontal_fov_degrees: DEFAULT_HORIZONTAL_FOV_DEGREES,
      camera_model_label: DEFAULT_CAMERA_MODEL_LABEL.to_string(),
    }
  }
}

/// 标注绘制参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawConfig {
  /// 标签字体文件，未指定或无法加载时使用内置字体
  pub font_path: Option<PathBuf>,
  pub font_size: f32,
  /// 边框与轮廓线宽（像素）
  pub line_width: u32,
  /// 标签背景内边距（像素）
  pub label_padding: i32,
  /// 多边形填充透明度
  pub polygon_fill_alpha: u8,
  /// 多边形标签背景透明度
  pub polygon_label_alpha: u8,
}

impl Default for DrawConfig {
  fn default() -> Self {
    Self {
      font_path: None,
      font_size: DEFAULT_FONT_SIZE,
      line_width: DEFAULT_LINE_WIDTH,
      label_padding: DEFAULT_LABEL_PADDING,
      polygon_fill_alpha: DEFAULT_POLYGON_FILL_ALPHA,
      polygon_label_alpha: DEFAULT_POLYGON_LABEL_ALPHA,
    }
  }
}

/// 引擎配置，每次调用时显式传入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  pub camera: CameraConfig,
  pub draw: DrawConfig,
  /// 颜色分析时检测区域缩放到的边长
  pub analysis_size: u32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      camera: CameraConfig::default(),
      draw: DrawConfig::default(),
      analysis_size: DEFAULT_ANALYSIS_SIZE,
    }
  }
}

impl EngineConfig {
  pub fn with_horizontal_fov(mut self, degrees: f64) -> Self {
    self.camera.horizontal_fov_degrees = degrees;
    self
  }

  pub fn with_camera_model(mut self, label: impl Into<String>) -> Self {
    self.camera.camera_model_label = label.into();
    self
  }

  pub fn with_font_path(mut self, path: Option<PathBuf>) -> Self {
    self.draw.font_path = path;
    self
  }

  pub fn with_analysis_size(mut self, size: u32) -> Self {
    self.analysis_size = size.max(1);
    self
  }
}
