//! ディレクトリを走査して画像とアノテーションのペアを作る

use anyhow::{Context, Result};
use image::RgbImage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::dataset::annotation::LabelmeAnnotation;
use crate::dataset::image_prep::load_rgb_image;
use crate::model::config::DatasetSettings;

/// 画像ファイルと対応するアノテーションファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePair {
    /// 拡張子を除いたファイル名
    pub name: String,
    pub image_path: PathBuf,
    pub annotation_path: PathBuf,
}

/// 学習サンプル（リサイズ済みのRGB画像と重心ラベル）
#[derive(Debug, Clone)]
pub struct CouplingSample {
    pub name: String,
    pub image: RgbImage,
    pub label: f32,
}

/// ペアになっているファイルを列挙する
///
/// ファイル名は辞書順に並べ、対応するアノテーションがない画像は読み飛ばします。
pub fn find_pairs(dir: &Path, settings: &DatasetSettings) -> Result<Vec<SamplePair>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read data directory: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(name) => log::debug!("UTF-8でないファイル名をスキップ: {:?}", name),
        }
    }
    files.sort();

    let file_set: HashSet<&str> = files.iter().map(String::as_str).collect();
    let mut pairs = Vec::new();

    for file in &files {
        let Some((base, ext)) = file.rsplit_once('.') else {
            continue;
        };
        if !settings.image_extensions.iter().any(|e| e == ext) {
            continue;
        }

        let annotation_file = format!("{}.{}", base, settings.annotation_extension);
        if !file_set.contains(annotation_file.as_str()) {
            log::debug!("アノテーションがないためスキップ: {}", file);
            continue;
        }

        pairs.push(SamplePair {
            name: base.to_string(),
            image_path: dir.join(file),
            annotation_path: dir.join(annotation_file),
        });
    }

    Ok(pairs)
}

/// ペア1組からサンプルを作成
pub fn load_sample(pair: &SamplePair, image_size: u32) -> Result<CouplingSample> {
    let annotation = LabelmeAnnotation::from_path(&pair.annotation_path)?;
    let label = annotation
        .centroid_x()
        .with_context(|| format!("Invalid annotation: {}", pair.annotation_path.display()))?;
    let image = load_rgb_image(&pair.image_path, image_size)?;

    Ok(CouplingSample {
        name: pair.name.clone(),
        image,
        label,
    })
}

/// ディレクトリ内の全サンプルを読み込む
pub fn load_samples(dir: &Path, settings: &DatasetSettings) -> Result<Vec<CouplingSample>> {
    let pairs = find_pairs(dir, settings)?;
    log::info!("{} 組の画像/アノテーションを検出: {}", pairs.len(), dir.display());

    pairs
        .iter()
        .map(|pair| load_sample(pair, settings.image_size))
        .collect()
}
