//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（入力サイズ、正規化方法など）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先のパスを決める（`.gz` で終わっていなければ `.tar.gz` を付ける）
pub fn artifact_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 実際に書き込んだパスを返す。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = artifact_path(output_path);

    // 親ディレクトリが存在しない場合は作成
    if let Some(parent) = tar_gz_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    // gzipのフッターまで書き切る
    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    Ok(tar_gz_path)
}

/// アーカイブ内のエントリを走査し、必要なものだけ読み込む
fn read_entries(
    tar_gz_path: &Path,
    want_metadata: bool,
    want_model: bool,
) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata = None;
    let mut model_binary = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();

        match path.to_str() {
            Some(METADATA_ENTRY) if want_metadata => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            Some(MODEL_ENTRY) if want_model => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary = Some(buffer);
            }
            _ => {}
        }

        if metadata.is_some() == want_metadata && model_binary.is_some() == want_model {
            break;
        }
    }

    Ok((metadata, model_binary))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    read_entries(tar_gz_path, true, false)?
        .0
        .ok_or_else(|| anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    read_entries(tar_gz_path, false, true)?
        .1
        .ok_or_else(|| anyhow::anyhow!("model.bin not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_entries(tar_gz_path, true, true)? {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

/// メタデータをログに出す
pub fn print_metadata_info(metadata: &ModelMetadata) {
    log::info!("=== モデルメタデータ ===");
    log::info!(
        "入力サイズ: {}x{} ({})",
        metadata.image_size,
        metadata.image_size,
        metadata.channel_order
    );
    log::info!("正規化: {}", metadata.normalization);
    log::info!("全結合層ユニット数: {}", metadata.hidden_units);
    log::info!(
        "学習: {} エポック, バッチサイズ {}, 学習率 {}",
        metadata.num_epochs,
        metadata.batch_size,
        metadata.learning_rate
    );
    log::info!("学習サンプル数: {}", metadata.num_samples);
    log::info!("学習日時: {}", metadata.trained_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Normalization;

    fn sample_metadata() -> ModelMetadata {
        ModelMetadata::new(128, Normalization::UnitRange, 128, 10, 32, 1e-3, 57)
    }

    #[test]
    fn test_artifact_path() {
        assert_eq!(
            artifact_path(Path::new("out/model")),
            PathBuf::from("out/model.tar.gz")
        );
        assert_eq!(
            artifact_path(Path::new("out/model.tar.gz")),
            PathBuf::from("out/model.tar.gz")
        );
        assert_eq!(
            artifact_path(Path::new("model.h5")),
            PathBuf::from("model.tar.gz")
        );
    }

    #[test]
    fn test_save_and_load_archive() {
        let temp = tempfile::tempdir().unwrap();
        let metadata = sample_metadata();
        let binary = vec![1u8, 2, 3, 4, 5];

        let written = save_model_with_metadata(&temp.path().join("nested/model"), &metadata, &binary)
            .unwrap();
        assert_eq!(written, temp.path().join("nested/model.tar.gz"));

        assert_eq!(load_metadata(&written).unwrap(), metadata);
        assert_eq!(load_model_binary(&written).unwrap(), binary);

        let (loaded_metadata, loaded_binary) = load_model_with_metadata(&written).unwrap();
        assert_eq!(loaded_metadata.channel_order, "RGB");
        assert_eq!(loaded_binary, binary);
    }

    #[test]
    fn test_archive_without_model_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("meta_only.tar.gz");

        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        let json = sample_metadata().to_json_string().unwrap();
        append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(load_metadata(&path).is_ok());
        assert!(load_model_binary(&path).is_err());
        assert!(load_model_with_metadata(&path).is_err());
    }
}
