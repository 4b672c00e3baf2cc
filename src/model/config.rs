//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、データセット、モデル、学習の設定をJSON形式で保存・読み込みします。
//! 設定ファイルがない場合のデフォルト値は元の学習スクリプトと同じ挙動になります。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::Normalization;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// データセット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// 画像とアノテーションが置かれたディレクトリ
    pub data_dir: String,
    /// 画像として扱う拡張子（ドットなし、大文字小文字を区別）
    pub image_extensions: Vec<String>,
    /// アノテーションの拡張子
    pub annotation_extension: String,
    /// 入力画像サイズ（正方形）
    pub image_size: u32,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            data_dir: "data/car_coupling_train".to_string(),
            image_extensions: vec!["jpeg".to_string()],
            annotation_extension: "json".to_string(),
            image_size: 128,
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 学習済みモデルの出力先（`.tar.gz` は自動で付く）
    pub output_path: String,
    /// 全結合層のユニット数
    pub hidden_units: usize,
    /// 画素値の正規化方法
    pub normalization: Normalization,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            output_path: "coupling_detector_model.tar.gz".to_string(),
            hidden_units: 128,
            normalization: Normalization::default(),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// ワーカー数
    pub num_workers: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// 検証用に取り分ける割合（0なら全データで学習）
    pub validation_ratio: f32,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 10,
            batch_size: 32,
            num_workers: 1,
            learning_rate: 1e-3,
            seed: 42,
            validation_ratio: 0.0,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// データセット設定
    pub dataset: DatasetSettings,
    /// モデル設定
    pub model: ModelSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("coupling_detector.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない場合はデフォルト設定を返す
    ///
    /// ファイルはあるが壊れている場合はエラーにする。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path).map_err(|e| {
                anyhow::anyhow!("設定ファイルの読み込みに失敗しました ({}): {}", path.display(), e)
            })?;
            log::info!("設定ファイルを読み込みました: {}", path.display());
            Ok(config)
        } else {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Ok(Self::default())
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定値の整合性チェック
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.training.batch_size == 0 {
            anyhow::bail!("batch_size は1以上にしてください");
        }
        if self.training.num_epochs == 0 {
            anyhow::bail!("num_epochs は1以上にしてください");
        }
        if !(0.0..1.0).contains(&self.training.validation_ratio) {
            anyhow::bail!(
                "validation_ratio は0以上1未満にしてください: {}",
                self.training.validation_ratio
            );
        }
        if self.dataset.image_extensions.is_empty() {
            anyhow::bail!("image_extensions が空です");
        }
        Ok(())
    }

    /// 設定情報をログに出す
    pub fn display(&self) {
        log::info!("=== アプリケーション設定 ===");
        log::info!("計算デバイス: {}", self.device_type);
        log::info!("データディレクトリ: {}", self.dataset.data_dir);
        log::info!(
            "画像拡張子: {} / アノテーション: {}",
            self.dataset.image_extensions.join(", "),
            self.dataset.annotation_extension
        );
        log::info!("入力サイズ: {}x{}", self.dataset.image_size, self.dataset.image_size);
        log::info!("出力先: {}", self.model.output_path);
        log::info!("正規化: {}", self.model.normalization);
        log::info!(
            "エポック数: {}, バッチサイズ: {}, 学習率: {}, シード: {}",
            self.training.num_epochs,
            self.training.batch_size,
            self.training.learning_rate,
            self.training.seed
        );
        if self.training.validation_ratio > 0.0 {
            log::info!("検証データの割合: {}", self.training.validation_ratio);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.dataset.data_dir, "data/car_coupling_train");
        assert_eq!(config.dataset.image_size, 128);
        assert_eq!(config.training.num_epochs, 10);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.learning_rate, 1e-3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"device_type": "Cpu", "training": {"num_epochs": 3}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.training.num_epochs, 3);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.model.normalization, Normalization::Raw);
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");

        let mut config = AppConfig::default();
        config.model.normalization = Normalization::ImageNet;
        config.training.seed = 7;
        config.save(&path).unwrap();

        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.model.normalization, Normalization::ImageNet);
        assert_eq!(loaded.training.seed, 7);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(temp.path().join("none.json")).unwrap();
        assert_eq!(config.training.num_epochs, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.training.validation_ratio = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
