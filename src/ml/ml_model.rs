//! カプラー位置回帰用のCNNモデル

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::{MseLoss, Reduction},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
    train::RegressionOutput,
};

/// 畳み込み各層の出力チャンネル数
pub const CONV_CHANNELS: [usize; 3] = [16, 32, 64];

/// 画像サイズのデフォルト
pub const IMAGE_SIZE: usize = 128;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 入力画像サイズ（正方形）
    #[config(default = 128)]
    pub image_size: usize,
    /// 全結合層のユニット数
    #[config(default = 128)]
    pub hidden_units: usize,
}

impl ModelConfig {
    /// 3ブロック通過後の特徴マップの一辺
    ///
    /// Conv (3x3, no padding): size -> size - 2
    /// Pool (2x2): size -> size / 2 (切り捨て)
    pub fn feature_map_size(&self) -> usize {
        (0..CONV_CHANNELS.len()).fold(self.image_size, |size, _| size.saturating_sub(2) / 2)
    }

    /// Flatten後の特徴次元
    pub fn flatten_dim(&self) -> usize {
        let size = self.feature_map_size();
        CONV_CHANNELS[CONV_CHANNELS.len() - 1] * size * size
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feature_map_size() == 0 {
            anyhow::bail!("入力サイズが小さすぎます: {} (最小22x22が必要)", self.image_size);
        }
        if self.hidden_units == 0 {
            anyhow::bail!("hidden_units は1以上にしてください");
        }
        Ok(())
    }

    /// モデルを初期化
    ///
    /// 入力サイズが小さすぎる場合はパニックする。先に [`ModelConfig::validate`] を呼ぶこと。
    pub fn init<B: Backend>(&self, device: &B::Device) -> CouplingRegressor<B> {
        let d = self.flatten_dim();
        assert!(d > 0, "入力サイズが小さすぎます: {}", self.image_size);

        log::debug!(
            "[Model] 入力: {0}x{0}, 特徴マップ: {1} x {2}x{2}, FC: {3} -> {4} -> 1",
            self.image_size,
            CONV_CHANNELS[2],
            self.feature_map_size(),
            d,
            self.hidden_units
        );

        let [c1, c2, c3] = CONV_CHANNELS;
        CouplingRegressor {
            conv1: Conv2dConfig::new([3, c1], [3, 3]).init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv2: Conv2dConfig::new([c1, c2], [3, 3]).init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv3: Conv2dConfig::new([c2, c3], [3, 3]).init(device),
            pool3: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            fc1: LinearConfig::new(d, self.hidden_units).init(device),
            fc2: LinearConfig::new(self.hidden_units, 1).init(device),

            activation: Relu::new(),
        }
    }
}

/// カプラー中心のx座標を回帰するCNN
///
/// # アーキテクチャ
/// - {Conv 3x3 (no padding, stride 1) + ReLU + MaxPool 2x2} x 3層
/// - Flatten
/// - FC: d -> hidden + ReLU
/// - FC: hidden -> 1
#[derive(Module, Debug)]
pub struct CouplingRegressor<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 16
    pool1: MaxPool2d,
    conv2: Conv2d<B>, // 16 -> 32
    pool2: MaxPool2d,
    conv3: Conv2d<B>, // 32 -> 64
    pool3: MaxPool2d,

    fc1: Linear<B>,
    fc2: Linear<B>,

    activation: Relu,
}

impl<B: Backend> CouplingRegressor<B> {
    /// 順伝播
    ///
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    /// - 戻り値: 予測x座標 [batch_size, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.pool1.forward(self.activation.forward(x));

        let x = self.conv2.forward(x);
        let x = self.pool2.forward(self.activation.forward(x));

        let x = self.conv3.forward(x);
        let x = self.pool3.forward(self.activation.forward(x));

        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.activation.forward(self.fc1.forward(x));
        self.fc2.forward(x)
    }

    /// 順伝播と平均二乗誤差（学習用）
    pub fn forward_regression(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 2>,
    ) -> RegressionOutput<B> {
        let output = self.forward(images);
        let loss = MseLoss::new().forward(output.clone(), targets.clone(), Reduction::Mean);

        RegressionOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_flatten_dim_for_default_size() {
        let config = ModelConfig::new();
        assert_eq!(config.image_size, IMAGE_SIZE);
        // 128 -> 126 -> 63 -> 61 -> 30 -> 28 -> 14
        assert_eq!(config.feature_map_size(), 14);
        assert_eq!(config.flatten_dim(), 64 * 14 * 14);
    }

    #[test]
    fn test_minimum_size() {
        assert!(ModelConfig::new().with_image_size(22).validate().is_ok());
        assert!(ModelConfig::new().with_image_size(21).validate().is_err());
    }

    #[test]
    fn test_forward_shape() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new()
            .with_image_size(32)
            .with_hidden_units(8)
            .init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(images);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_regression_loss_is_mse() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new()
            .with_image_size(32)
            .with_hidden_units(8)
            .init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device);
        let targets = Tensor::<TestBackend, 1>::from_floats([10.0, 20.0, 30.0], &device)
            .reshape([3, 1]);
        let item = model.forward_regression(images, targets.clone());

        let expected: f32 = (item.output.clone() - targets)
            .powf_scalar(2.0)
            .mean()
            .into_scalar();
        let loss: f32 = item.loss.into_scalar();
        assert!((loss - expected).abs() < 1e-3 * expected.max(1.0));
    }
}
