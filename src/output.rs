// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::config::DrawConfig;

pub trait Render<Image: ?Sized, Detections: ?Sized>: Sized {
  type Error;
  fn render_result(
    &self,
    image: &Image,
    result: &Detections,
  ) -> Result<RenderedImage, Self::Error>;
}

/// 一次渲染的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
  pub path: PathBuf,
  pub drawn: usize,
  pub skipped: usize,
}

pub const BOX_IMAGE_SCHEME: &str = "image";
pub const POLYGON_IMAGE_SCHEME: &str = "polygon";
pub const FOLDER_RECORD_SCHEME: &str = "folder";

#[cfg(any(feature = "save_box_image", feature = "save_polygon_image"))]
pub mod draw;

#[cfg(feature = "save_box_image")]
mod save_box_image;
#[cfg(feature = "save_box_image")]
pub use self::save_box_image::SaveBoxImageOutput;

#[cfg(feature = "save_polygon_image")]
mod save_polygon_image;
#[cfg(feature = "save_polygon_image")]
pub use self::save_polygon_image::SavePolygonImageOutput;

mod folder_record;
pub use self::folder_record::{FolderRecordOutput, FolderStyle};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("渲染器不可用（未启用 {0} 输出）")]
  RendererUnavailable(String),
  #[error("输出路径无效: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

impl OutputError {
  /// 渲染依赖缺失，调用方应报告服务不可用
  pub fn is_unavailable(&self) -> bool {
    matches!(self, OutputError::RendererUnavailable(_))
  }
}

/// 从 URL 中取出解码后的文件路径
pub(crate) fn url_path(url: &Url) -> Result<PathBuf, OutputError> {
  let path = urlencoding::decode(url.path())
    .map_err(|err| OutputError::InvalidPath(format!("{}: {}", url, err)))?;
  if path.is_empty() || path.ends_with('/') {
    return Err(OutputError::InvalidPath(url.to_string()));
  }
  Ok(Path::new(path.as_ref()).to_path_buf())
}

pub enum OutputWrapper {
  #[cfg(feature = "save_box_image")]
  SaveBoxImageOutput(SaveBoxImageOutput),
  #[cfg(feature = "save_polygon_image")]
  SavePolygonImageOutput(SavePolygonImageOutput),
  FolderRecordOutput(FolderRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_config(url, &DrawConfig::default())
  }
}

impl OutputWrapper {
  pub fn from_url_with_config(url: &Url, config: &DrawConfig) -> Result<Self, OutputError> {
    match url.scheme() {
      #[cfg(feature = "save_box_image")]
      BOX_IMAGE_SCHEME => {
        let output = SaveBoxImageOutput::from_url_with_config(url, config)?;
        Ok(OutputWrapper::SaveBoxImageOutput(output))
      }
      #[cfg(feature = "save_polygon_image")]
      POLYGON_IMAGE_SCHEME => {
        let output = SavePolygonImageOutput::from_url_with_config(url, config)?;
        Ok(OutputWrapper::SavePolygonImageOutput(output))
      }
      #[cfg(not(feature = "save_box_image"))]
      BOX_IMAGE_SCHEME => Err(OutputError::RendererUnavailable(BOX_IMAGE_SCHEME.to_string())),
      #[cfg(not(feature = "save_polygon_image"))]
      POLYGON_IMAGE_SCHEME => Err(OutputError::RendererUnavailable(
        POLYGON_IMAGE_SCHEME.to_string(),
      )),
      FOLDER_RECORD_SCHEME => {
        let output = FolderRecordOutput::from_url_with_config(url, config)?;
        Ok(OutputWrapper::FolderRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<RgbImage, [Value]> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    image: &RgbImage,
    result: &[Value],
  ) -> Result<RenderedImage, Self::Error> {
    match self {
      #[cfg(feature = "save_box_image")]
      OutputWrapper::SaveBoxImageOutput(output) => output.render_result(image, result),
      #[cfg(feature = "save_polygon_image")]
      OutputWrapper::SavePolygonImageOutput(output) => output.render_result(image, result),
      OutputWrapper::FolderRecordOutput(output) => output.render_result(image, result),
    }
  }
}
