//! 画像の読み込みと前処理

use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ImageNetの平均と標準偏差
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 画素値の正規化方法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// 0〜255のまま
    #[default]
    Raw,
    /// 0〜1に縮小
    UnitRange,
    /// 0〜1に縮小した後、ImageNetの平均と標準偏差で正規化
    ImageNet,
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Normalization::Raw => write!(f, "raw"),
            Normalization::UnitRange => write!(f, "unit_range"),
            Normalization::ImageNet => write!(f, "imagenet"),
        }
    }
}

impl Normalization {
    fn apply(self, channel: usize, value: u8) -> f32 {
        match self {
            Normalization::Raw => value as f32,
            Normalization::UnitRange => value as f32 / 255.0,
            Normalization::ImageNet => {
                (value as f32 / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            }
        }
    }
}

/// 画像を読み込み、RGBに変換して `size x size` にリサイズする
pub fn load_rgb_image(path: &Path, size: u32) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .to_rgb8();
    Ok(resize_rgb(&img, size))
}

/// バイリニア補間でリサイズ（既に同じサイズならそのままコピー）
pub fn resize_rgb(img: &RgbImage, size: u32) -> RgbImage {
    if img.dimensions() == (size, size) {
        return img.clone();
    }
    image::imageops::resize(img, size, size, FilterType::Triangle)
}

/// 画像を (C, H, W) の順で平坦化した浮動小数点列に変換
pub fn image_to_chw(img: &RgbImage, normalization: Normalization) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(3 * (width * height) as usize);

    for channel in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let pixel = img.get_pixel(x, y);
                data.push(normalization.apply(channel, pixel[channel]));
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_chw_layout() {
        // 2x1: 左が赤、右が青
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));

        let data = image_to_chw(&img, Normalization::Raw);
        assert_eq!(data, vec![255.0, 0.0, 0.0, 0.0, 0.0, 255.0]);
    }

    #[test]
    fn test_default_keeps_raw_pixel_values() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 128, 0]));
        assert_eq!(Normalization::default(), Normalization::Raw);
        assert_eq!(image_to_chw(&img, Normalization::default()), vec![255.0, 128.0, 0.0]);
    }

    #[test]
    fn test_unit_range() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 51, 0]));
        let data = image_to_chw(&img, Normalization::UnitRange);
        assert!((data[0] - 1.0).abs() < 1e-6);
        assert!((data[1] - 0.2).abs() < 1e-6);
        assert_eq!(data[2], 0.0);
    }

    #[test]
    fn test_imagenet_mean_maps_to_zero() {
        let img = RgbImage::from_pixel(1, 1, Rgb([124, 116, 104]));
        let data = image_to_chw(&img, Normalization::ImageNet);
        for value in data {
            assert!(value.abs() < 0.02, "value {value} should be near zero");
        }
    }

    #[test]
    fn test_resize_to_square() {
        let img = RgbImage::from_pixel(40, 20, Rgb([10, 20, 30]));
        let resized = resize_rgb(&img, 8);
        assert_eq!(resized.dimensions(), (8, 8));
        let pixel = resized.get_pixel(3, 3);
        for (got, want) in pixel.0.iter().zip([10u8, 20, 30]) {
            assert!(got.abs_diff(want) <= 1);
        }
    }
}
