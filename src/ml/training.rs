//! モデル学習

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::Module,
    optim::AdamConfig,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
    train::{
        metric::LossMetric, LearnerBuilder, LearningStrategy, RegressionOutput, TrainOutput,
        TrainStep, ValidStep,
    },
};

use crate::dataset::{image_to_chw, load_samples, CouplingSample, Normalization};
use crate::ml::{CouplingRegressor, ModelConfig};
use crate::model::{save_model_with_metadata, AppConfig, DeviceType, ModelMetadata};

/// 学習データセット
///
/// サンプル本体は `Arc` で共有し、分割はインデックス範囲のみで表す。
#[derive(Clone)]
pub struct CouplingDataset {
    samples: Arc<[CouplingSample]>,
    start_idx: usize,
    end_idx: usize,
}

impl CouplingDataset {
    pub fn new(samples: Vec<CouplingSample>) -> Self {
        let len = samples.len();
        Self {
            samples: samples.into(),
            start_idx: 0,
            end_idx: len,
        }
    }

    /// シャッフルしてから学習用と検証用に分割
    pub fn split(self, validation_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut shuffled: Vec<CouplingSample> = self.samples[self.start_idx..self.end_idx].to_vec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        shuffled.shuffle(&mut rng);

        // 学習側は floor(n * (1 - ratio))、残りを検証側にする（Kerasの validation_split と同じ）
        let total_len = shuffled.len();
        let train_len = ((total_len as f64 * (1.0 - validation_ratio as f64)) + 1e-6).floor() as usize;
        let train_len = train_len.min(total_len);
        let samples: Arc<[CouplingSample]> = shuffled.into();

        let train = Self {
            samples: samples.clone(),
            start_idx: 0,
            end_idx: train_len,
        };
        let valid = Self {
            samples,
            start_idx: train_len,
            end_idx: total_len,
        };

        (train, valid)
    }

    /// ラベルの (最小, 最大, 平均)
    pub fn label_stats(&self) -> Option<(f32, f32, f32)> {
        let labels = &self.samples[self.start_idx..self.end_idx];
        if labels.is_empty() {
            return None;
        }
        let (min, max, sum) = labels.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
            |(min, max, sum), s| (min.min(s.label), max.max(s.label), sum + s.label as f64),
        );
        Some((min, max, (sum / labels.len() as f64) as f32))
    }
}

impl Dataset<CouplingSample> for CouplingDataset {
    fn get(&self, index: usize) -> Option<CouplingSample> {
        let actual_index = self.start_idx + index;
        if actual_index >= self.end_idx {
            return None;
        }
        self.samples.get(actual_index).cloned()
    }

    fn len(&self) -> usize {
        self.end_idx - self.start_idx
    }
}

/// バッチャー
#[derive(Clone, Debug)]
pub struct CouplingBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
    normalization: Normalization,
}

impl<B: Backend> CouplingBatcher<B> {
    pub fn new(device: B::Device, image_size: usize, normalization: Normalization) -> Self {
        Self {
            device,
            image_size,
            normalization,
        }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct CouplingBatch<B: Backend> {
    /// [batch_size, 3, size, size]
    pub images: Tensor<B, 4>,
    /// [batch_size, 1]
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> Batcher<B, CouplingSample, CouplingBatch<B>> for CouplingBatcher<B> {
    fn batch(&self, items: Vec<CouplingSample>, _device: &B::Device) -> CouplingBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut targets = Vec::with_capacity(batch_size);

        for item in &items {
            debug_assert_eq!(item.image.dimensions(), (size as u32, size as u32));
            all_pixels.extend(image_to_chw(&item.image, self.normalization));
            targets.push(item.label);
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, 3, size, size]);
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        CouplingBatch { images, targets }
    }
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<CouplingBatch<B>, RegressionOutput<B>> for CouplingRegressor<B> {
    fn step(&self, batch: CouplingBatch<B>) -> TrainOutput<RegressionOutput<B>> {
        let item = self.forward_regression(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<CouplingBatch<B>, RegressionOutput<B>> for CouplingRegressor<B> {
    fn step(&self, batch: CouplingBatch<B>) -> RegressionOutput<B> {
        self.forward_regression(batch.images, batch.targets)
    }
}

/// [`fit`] の結果
pub struct FitOutcome {
    /// 学習済みモデルの重み
    pub model_binary: Vec<u8>,
    pub num_params: usize,
    pub num_train: usize,
    pub num_valid: usize,
}

/// 学習結果の概要
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// 書き込んだモデルファイル
    pub model_path: PathBuf,
    pub num_train: usize,
    pub num_valid: usize,
    pub num_params: usize,
}

/// Kerasの既定値に合わせたAdam
pub fn optimizer_config() -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-7)
}

/// モデルの重みをバイト列にする
pub fn model_to_bytes<B: Backend>(model: CouplingRegressor<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みのシリアライズエラー: {:?}", e))
}

/// 設定からモデル構成を作る
pub fn model_config(config: &AppConfig) -> ModelConfig {
    ModelConfig::new()
        .with_image_size(config.dataset.image_size as usize)
        .with_hidden_units(config.model.hidden_units)
}

/// 読み込み済みのデータセットでモデルを学習する
pub fn fit<B: AutodiffBackend>(
    config: &AppConfig,
    dataset: CouplingDataset,
    device: &B::Device,
    artifact_dir: &Path,
) -> Result<FitOutcome> {
    let training = &config.training;
    let image_size = config.dataset.image_size as usize;
    let normalization = config.model.normalization;

    let model_config = model_config(config);
    model_config.validate()?;

    // 検証割合0なら全データで学習し、検証パスも全データで行う
    let (dataset_train, dataset_valid) = if training.validation_ratio > 0.0 {
        dataset.split(training.validation_ratio, training.seed)
    } else {
        (dataset.clone(), dataset)
    };
    if dataset_train.is_empty() || dataset_valid.is_empty() {
        anyhow::bail!(
            "学習データが足りません (学習: {} 枚, 検証: {} 枚)",
            dataset_train.len(),
            dataset_valid.len()
        );
    }
    let num_train = dataset_train.len();
    let num_valid = dataset_valid.len();
    log::info!("学習データ: {} 枚", num_train);
    log::info!("検証データ: {} 枚", num_valid);

    let batcher_train = CouplingBatcher::<B>::new(device.clone(), image_size, normalization);
    let batcher_valid =
        CouplingBatcher::<B::InnerBackend>::new(device.clone(), image_size, normalization);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(training.batch_size)
        .shuffle(training.seed)
        .num_workers(training.num_workers)
        .build(dataset_train);

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(training.batch_size)
        .num_workers(training.num_workers)
        .build(dataset_valid);

    let model = model_config.init::<B>(device);

    std::fs::create_dir_all(artifact_dir).with_context(|| {
        format!("Failed to create artifact directory: {}", artifact_dir.display())
    })?;
    let artifact_dir_str = artifact_dir.to_string_lossy().to_string();

    log::info!(
        "学習を開始します (エポック数: {}, バッチサイズ: {}, 学習率: {})",
        training.num_epochs,
        training.batch_size,
        training.learning_rate
    );

    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(training.num_epochs)
        .summary()
        .build(model, optimizer_config().init(), training.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    log::info!("学習が完了しました");

    let trained_model = model_trained.model;
    let num_params = trained_model.num_params();
    log::info!(
        "学習済みモデルの総パラメータ数: {} ({:.2}M)",
        num_params,
        num_params as f64 / 1_000_000.0
    );

    Ok(FitOutcome {
        model_binary: model_to_bytes(trained_model)?,
        num_params,
        num_train,
        num_valid,
    })
}

/// データ読み込みから学習、保存までを実行
pub fn train_model<B: AutodiffBackend>(
    config: &AppConfig,
    device: B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    model_config(config).validate()?;

    let data_dir = Path::new(&config.dataset.data_dir);
    let samples = load_samples(data_dir, &config.dataset)?;
    if samples.is_empty() {
        anyhow::bail!("No training samples found in {}", data_dir.display());
    }

    let dataset = CouplingDataset::new(samples);
    if let Some((min, max, mean)) = dataset.label_stats() {
        log::info!("ラベル (x座標): 最小 {:.1}, 最大 {:.1}, 平均 {:.1}", min, max, mean);
    }

    // Learnerのログ出力先（終了後に削除）
    let artifact_dir = std::env::temp_dir().join(format!(
        "coupling_detector_training_{}",
        std::process::id()
    ));

    let fitted = fit::<B>(config, dataset, &device, &artifact_dir);
    std::fs::remove_dir_all(&artifact_dir).ok();
    let fitted = fitted?;

    let metadata = ModelMetadata::new(
        config.dataset.image_size,
        config.model.normalization,
        config.model.hidden_units,
        config.training.num_epochs as u32,
        config.training.batch_size as u32,
        config.training.learning_rate,
        fitted.num_train as u32,
    );

    let model_path = save_model_with_metadata(
        Path::new(&config.model.output_path),
        &metadata,
        &fitted.model_binary,
    )?;
    log::info!(
        "モデルを保存しました: {} ({:.2} MB)",
        model_path.display(),
        std::fs::metadata(&model_path)?.len() as f64 / 1024.0 / 1024.0
    );

    Ok(TrainingSummary {
        model_path,
        num_train: fitted.num_train,
        num_valid: fitted.num_valid,
        num_params: fitted.num_params,
    })
}

/// 設定のデバイス種別に応じたバックエンドで学習
pub fn train_with_config(config: &AppConfig) -> Result<TrainingSummary> {
    log::info!("使用デバイス: {}", config.device_type);
    match config.device_type {
        DeviceType::Wgpu => train_model::<burn_autodiff::Autodiff<burn_wgpu::Wgpu>>(
            config,
            burn_wgpu::WgpuDevice::default(),
        ),
        DeviceType::Cpu => train_model::<burn_autodiff::Autodiff<burn_ndarray::NdArray<f32>>>(
            config,
            burn_ndarray::NdArrayDevice::Cpu,
        ),
    }
}
