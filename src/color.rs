// 该文件是 Agriscan （田间扫描） 项目的一部分。
// src/color.rs - 类别颜色分配与颜色空间转换
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

use image::Rgb;

use crate::detection::ClassKey;

/// 20 种参考颜色（与常见 YOLO 可视化一致）
pub const PALETTE_HEX: [&str; 20] = [
  "FF3838", "FF9D97", "FF701F", "FFB21D", "CFD231", "48F90A", "92CC17", "3DDB86", "1A9334",
  "00D4BB", "2C99A8", "00C2FF", "344593", "6473FF", "0018EC", "8438FF", "520085", "CB38FF",
  "FF95C8", "FF37C7",
];

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 十六进制颜色转 RGB，格式不合法时返回白色
pub fn hex_to_rgb(value: &str) -> Rgb<u8> {
  let value = value.trim().trim_start_matches('#');
  if value.len() != 6 || !value.is_ascii() {
    return WHITE;
  }

  let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&value[range], 16).ok();
  match (channel(0..2), channel(2..4), channel(4..6)) {
    (Some(r), Some(g), Some(b)) => Rgb([r, g, b]),
    _ => WHITE,
  }
}

/// 64 位 FNV-1a，用于字符串类别的稳定取色
pub fn fnv1a(bytes: &[u8]) -> u64 {
  bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
    (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
  })
}

/// 类别在调色板中的位置
pub fn palette_index(key: &ClassKey) -> usize {
  let len = PALETTE_HEX.len();
  match key {
    ClassKey::Index(id) => id.rem_euclid(len as i64) as usize,
    ClassKey::Name(name) => (fnv1a(name.as_bytes()) % len as u64) as usize,
  }
}

/// 类别对应的 RGB 颜色
pub fn class_color(key: &ClassKey) -> Rgb<u8> {
  hex_to_rgb(PALETTE_HEX[palette_index(key)])
}

/// RGB 转 HSV，三个分量均映射到 0-255
pub fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  if max == min {
    return [0, 0, max];
  }

  let (r, g, b) = (r as f32, g as f32, b as f32);
  let (maxf, minf) = (max as f32, min as f32);
  let chroma = maxf - minf;
  let s = chroma / maxf;

  let rc = (maxf - r) / chroma;
  let gc = (maxf - g) / chroma;
  let bc = (maxf - b) / chroma;
  let h = if r == maxf {
    bc - gc
  } else if g == maxf {
    2.0 + rc - bc
  } else {
    4.0 + gc - rc
  };
  // 取模在双精度下完成，结果存回单精度
  let h = ((h as f64 / 6.0 + 1.0) % 1.0) as f32;

  [
    (h as f64 * 255.0).clamp(0.0, 255.0) as u8,
    (s as f64 * 255.0).clamp(0.0, 255.0) as u8,
    max,
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hex_parsing() {
    assert_eq!(hex_to_rgb("FF3838"), Rgb([255, 56, 56]));
    assert_eq!(hex_to_rgb("#00c2ff"), Rgb([0, 194, 255]));
    assert_eq!(hex_to_rgb("FFF"), WHITE);
    assert_eq!(hex_to_rgb("GG0000"), WHITE);
    assert_eq!(hex_to_rgb("ÿÿÿ"), WHITE);
  }

  #[test]
  fn integer_indices_wrap_around_palette() {
    for i in 0..20 {
      assert_eq!(
        class_color(&ClassKey::Index(i)),
        class_color(&ClassKey::Index(i + 20))
      );
      assert_eq!(
        class_color(&ClassKey::Index(i)),
        class_color(&ClassKey::Index(i + 400))
      );
    }
    assert_eq!(palette_index(&ClassKey::Index(-1)), 19);
    assert_eq!(class_color(&ClassKey::Index(0)), Rgb([255, 56, 56]));
  }

  #[test]
  fn string_colors_are_stable() {
    let key = ClassKey::Name("corn".to_string());
    let first = class_color(&key);
    for _ in 0..10 {
      assert_eq!(class_color(&key), first);
    }
    // FNV-1a 参考值
    assert_eq!(fnv1a(b""), FNV_OFFSET_BASIS);
    assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
  }

  #[test]
  fn hsv_matches_reference_values() {
    assert_eq!(rgb_to_hsv(Rgb([0, 0, 0])), [0, 0, 0]);
    assert_eq!(rgb_to_hsv(Rgb([200, 200, 200])), [0, 0, 200]);
    assert_eq!(rgb_to_hsv(Rgb([255, 0, 0])), [0, 255, 255]);
    // 纯绿：h = 1/3
    assert_eq!(rgb_to_hsv(Rgb([0, 255, 0])), [85, 255, 255]);
    // 纯蓝：h = 2/3
    assert_eq!(rgb_to_hsv(Rgb([0, 0, 255])), [170, 255, 255]);
    // 黄：h = 1/6
    assert_eq!(rgb_to_hsv(Rgb([255, 255, 0])), [42, 255, 255]);
  }
}
