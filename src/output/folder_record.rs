// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/output/folder_record.rs - 按日期分目录的标注图像输出
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use image::RgbImage;
use serde_json::Value;
use url::Url;

#[cfg(feature = "save_box_image")]
use crate::output::SaveBoxImageOutput;
#[cfg(feature = "save_polygon_image")]
use crate::output::SavePolygonImageOutput;
#[cfg(any(feature = "save_box_image", feature = "save_polygon_image"))]
use crate::output::draw::Draw;
use crate::config::DrawConfig;
use crate::output::{
  BOX_IMAGE_SCHEME, FOLDER_RECORD_SCHEME, OutputError, POLYGON_IMAGE_SCHEME, Render,
  RenderedImage,
};
use crate::{FromUrl, FromUrlWithScheme};

const DEFAULT_EXTENSION: &str = "jpg";

// 进程内所有目录输出共用，保证同一毫秒内的文件名也不重复
static FRAME_COUNTER: AtomicU16 = AtomicU16::new(0);

/// 目录输出使用的渲染方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderStyle {
  #[default]
  Box,
  Polygon,
}

impl FolderStyle {
  fn suffix(&self) -> &'static str {
    match self {
      FolderStyle::Box => "rf",
      FolderStyle::Polygon => "poly",
    }
  }
}

enum FolderRenderer {
  #[cfg(feature = "save_box_image")]
  Box(SaveBoxImageOutput),
  #[cfg(feature = "save_polygon_image")]
  Polygon(SavePolygonImageOutput),
}

impl FolderRenderer {
  fn with(style: FolderStyle, directory: &Path, config: &DrawConfig) -> Result<Self, OutputError> {
    match style {
      #[cfg(feature = "save_box_image")]
      FolderStyle::Box => Ok(FolderRenderer::Box(SaveBoxImageOutput::new(
        directory.to_path_buf(),
        Draw::new(config),
      ))),
      #[cfg(feature = "save_polygon_image")]
      FolderStyle::Polygon => Ok(FolderRenderer::Polygon(SavePolygonImageOutput::new(
        directory.to_path_buf(),
        Draw::new(config),
      ))),
      #[cfg(not(feature = "save_box_image"))]
      FolderStyle::Box => {
        let _ = (directory, config);
        Err(OutputError::RendererUnavailable(BOX_IMAGE_SCHEME.to_string()))
      }
      #[cfg(not(feature = "save_polygon_image"))]
      FolderStyle::Polygon => {
        let _ = (directory, config);
        Err(OutputError::RendererUnavailable(POLYGON_IMAGE_SCHEME.to_string()))
      }
    }
  }
}

/// 每次渲染在 `目录/年/月/日/` 下生成不重复的文件名
pub struct FolderRecordOutput {
  directory: PathBuf,
  style: FolderStyle,
  extension: String,
  renderer: FolderRenderer,
}

impl FromUrlWithScheme for FolderRecordOutput {
  const SCHEME: &'static str = FOLDER_RECORD_SCHEME;
}

impl FromUrl for FolderRecordOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_config(url, &DrawConfig::default())
  }
}

impl FolderRecordOutput {
  pub fn from_url_with_config(url: &Url, config: &DrawConfig) -> Result<Self, OutputError> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let directory = urlencoding::decode(url.path())
      .map_err(|err| OutputError::InvalidPath(format!("{}: {}", url, err)))?;
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() {
      return Err(OutputError::InvalidPath(url.to_string()));
    }

    let mut style = FolderStyle::default();
    let mut extension = DEFAULT_EXTENSION.to_string();
    for (key, value) in url.query_pairs() {
      match &*key {
        "style" if value == POLYGON_IMAGE_SCHEME => style = FolderStyle::Polygon,
        "style" if value == "box" || value == BOX_IMAGE_SCHEME => style = FolderStyle::Box,
        "style" => {
          return Err(OutputError::InvalidPath(format!("未知的渲染方式: {}", value)));
        }
        "ext" if !value.is_empty() => extension = value.trim_start_matches('.').to_lowercase(),
        _ => {}
      }
    }

    let directory = PathBuf::from(directory);
    let renderer = FolderRenderer::with(style, &directory, config)?;
    Ok(FolderRecordOutput {
      directory,
      style,
      extension,
      renderer,
    })
  }

  pub fn style(&self) -> FolderStyle {
    self.style
  }

  fn frame_id() -> u16 {
    FRAME_COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// 下一个输出文件路径
  pub fn frame_path(&self) -> PathBuf {
    let now = Utc::now();
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(format!(
        "{}-{:04X}_{}.{}",
        now.format("%H-%M-%S-%3f"),
        Self::frame_id(),
        self.style.suffix(),
        self.extension
      ))
  }
}

impl Render<RgbImage, [Value]> for FolderRecordOutput {
  type Error = OutputError;

  fn render_result(
    &self,
    image: &RgbImage,
    result: &[Value],
  ) -> Result<RenderedImage, Self::Error> {
    let path = self.frame_path();
    match &self.renderer {
      #[cfg(feature = "save_box_image")]
      FolderRenderer::Box(output) => output.render_into(image, result, &path),
      #[cfg(feature = "save_polygon_image")]
      FolderRenderer::Polygon(output) => output.render_into(image, result, &path),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = (image, result, path);
        Err(OutputError::RendererUnavailable(FOLDER_RECORD_SCHEME.to_string()))
      }
    }
  }
}
