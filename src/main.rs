// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/main.rs - 命令行入口
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

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::info;
use url::Url;

use agriscan::{Engine, EngineConfig, ScanRequest, SourceImage};

/// Agriscan 田间扫描参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 源图像文件
  #[arg(long, value_name = "IMAGE")]
  pub image: PathBuf,
  /// 检测结果 JSON 文件（数组，或带有 predictions / detections 字段的对象）
  #[arg(long, value_name = "FILE")]
  pub detections: PathBuf,
  /// 标注输出位置
  /// 支持格式:
  /// - 矩形框: image:///path/out.jpg
  /// - 多边形: polygon:///path/out.jpg
  /// - 目录: folder:///path/dir?style=polygon&ext=png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 飞行高度（米）
  #[arg(long, value_name = "METERS")]
  pub altitude: Option<f64>,
  /// 相机水平视场角（度）
  #[arg(long, value_name = "DEGREES")]
  pub hfov: Option<f64>,
  /// 报告中的相机型号说明
  #[arg(long, value_name = "LABEL")]
  pub camera_model: Option<String>,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

impl Args {
  fn engine_config(&self) -> EngineConfig {
    let mut config = EngineConfig::default().with_font_path(self.font.clone());
    if let Some(hfov) = self.hfov {
      config = config.with_horizontal_fov(hfov);
    }
    if let Some(label) = &self.camera_model {
      config = config.with_camera_model(label.clone());
    }
    config
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("源图像: {}", args.image.display());
  info!("检测结果: {}", args.detections.display());
  info!("输出路径: {}", args.output);

  let raw = std::fs::read_to_string(&args.detections)
    .with_context(|| format!("无法读取检测结果 {}", args.detections.display()))?;
  let payload: Value = serde_json::from_str(&raw)
    .with_context(|| format!("无法解析检测结果 {}", args.detections.display()))?;

  let request = ScanRequest::from_payload(
    SourceImage::Path(args.image.clone()),
    &payload,
    args.output.clone(),
  )
  .with_altitude(args.altitude);

  let engine = Engine::new(args.engine_config());
  let report = engine.process(&request).context("扫描处理失败")?;

  println!("{}", serde_json::to_string_pretty(&report)?);

  Ok(())
}
