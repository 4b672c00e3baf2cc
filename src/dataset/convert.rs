//! JPEG画像をPNGに一括変換する

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// 一括変換の結果
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// JPEG画像を1枚PNGに変換
pub fn convert_jpeg_to_png(jpeg_path: &Path, png_path: &Path) -> Result<()> {
    let img = image::open(jpeg_path)
        .with_context(|| format!("Failed to decode: {}", jpeg_path.display()))?;
    img.save_with_format(png_path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write: {}", png_path.display()))?;
    Ok(())
}

/// ディレクトリ内の `*.jpeg` を同じ名前の `.png` に変換する
///
/// 個別のファイルの失敗はログに出して続行します。
pub fn convert_all_jpegs_in_directory(directory: &Path) -> Result<ConversionReport> {
    let mut jpegs = Vec::new();
    for entry in std::fs::read_dir(directory)
        .with_context(|| format!("Failed to read directory: {}", directory.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jpeg") {
            jpegs.push(path);
        }
    }
    jpegs.sort();

    let mut report = ConversionReport::default();
    for jpeg_path in jpegs {
        let png_path = jpeg_path.with_extension("png");
        match convert_jpeg_to_png(&jpeg_path, &png_path) {
            Ok(()) => {
                log::info!("変換: {} -> {}", jpeg_path.display(), png_path.display());
                report.converted.push(png_path);
            }
            Err(e) => {
                log::error!("変換失敗 {}: {:#}", jpeg_path.display(), e);
                report.failed.push((jpeg_path, format!("{:#}", e)));
            }
        }
    }

    Ok(report)
}
