//! モデルメタデータの定義
//!
//! 推論時に学習時と同じ前処理を再現するための情報を保持します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::Normalization;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// モデル入力サイズ（正方形）
    pub image_size: u32,

    /// チャンネル順（常に "RGB"）
    pub channel_order: String,

    /// 画素値の正規化方法
    pub normalization: Normalization,

    /// 全結合層のユニット数
    pub hidden_units: usize,

    /// 学習エポック数
    pub num_epochs: u32,

    /// バッチサイズ
    pub batch_size: u32,

    /// 学習率
    pub learning_rate: f64,

    /// 学習に使ったサンプル数
    pub num_samples: u32,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        image_size: u32,
        normalization: Normalization,
        hidden_units: usize,
        num_epochs: u32,
        batch_size: u32,
        learning_rate: f64,
        num_samples: u32,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            image_size,
            channel_order: "RGB".to_string(),
            normalization,
            hidden_units,
            num_epochs,
            batch_size,
            learning_rate,
            num_samples,
            trained_at,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
