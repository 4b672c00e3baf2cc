//! モデル推論機能

use anyhow::Result;
use image::RgbImage;
use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};

use crate::dataset::{image_to_chw, load_rgb_image, resize_rgb};
use crate::ml::{CouplingRegressor, ModelConfig};
use crate::model::{load_model_with_metadata, ModelMetadata};

/// 推論エンジン
///
/// 学習時のメタデータに従って前処理を行い、カプラー中心のx座標を予測する。
pub struct CouplingDetector<B: Backend> {
    model: CouplingRegressor<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> CouplingDetector<B> {
    /// モデルファイルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        Self::from_parts(metadata, model_binary, device)
    }

    /// メタデータと重みのバイト列から初期化
    pub fn from_parts(metadata: ModelMetadata, model_binary: Vec<u8>, device: B::Device) -> Result<Self> {
        let model_config = ModelConfig::new()
            .with_image_size(metadata.image_size as usize)
            .with_hidden_units(metadata.hidden_units);
        model_config.validate()?;

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        let model = model_config.init::<B>(&device).load_record(record);

        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// 読み込み済み画像から予測（サイズが違えばリサイズする）
    pub fn predict_rgb(&self, image: &RgbImage) -> Result<f32> {
        let size = self.metadata.image_size;
        let resized = resize_rgb(image, size);
        let size = size as usize;

        let data = image_to_chw(&resized, self.metadata.normalization);
        let tensor = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device)
            .reshape([1, 3, size, size]);

        let output = self.model.forward(tensor);
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        values
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("推論結果が空です"))
    }

    /// 画像ファイル1枚から予測
    pub fn predict_image<P: AsRef<Path>>(&self, image_path: P) -> Result<f32> {
        let image = load_rgb_image(image_path.as_ref(), self.metadata.image_size)?;
        self.predict_rgb(&image)
    }

    /// 複数画像をまとめて予測
    pub fn predict_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<f32>> {
        image_paths
            .iter()
            .map(|path| self.predict_image(path))
            .collect()
    }

    /// メタデータへの参照を取得
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
