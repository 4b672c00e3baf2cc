use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use coupling_detector_lib::ml::train_with_config;
use coupling_detector_lib::model::{AppConfig, DeviceType};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DeviceArg {
    Wgpu,
    Cpu,
}

impl From<DeviceArg> for DeviceType {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Wgpu => DeviceType::Wgpu,
            DeviceArg::Cpu => DeviceType::Cpu,
        }
    }
}

/// 画像とアノテーションのペアからカプラー検出モデルを学習する
#[derive(Parser, Debug)]
#[command(name = "coupling_detector", version)]
struct Args {
    /// 設定ファイル（なければデフォルト設定）
    #[arg(long, default_value_os_t = AppConfig::default_path())]
    config: PathBuf,
    /// 学習データのディレクトリ
    #[arg(long)]
    data_dir: Option<String>,
    /// モデルの出力先
    #[arg(long)]
    output: Option<String>,
    /// 計算デバイス
    #[arg(long, value_enum)]
    device: Option<DeviceArg>,
    /// エポック数
    #[arg(long)]
    epochs: Option<usize>,
    /// バッチサイズ
    #[arg(long)]
    batch_size: Option<usize>,
    /// 学習率
    #[arg(long)]
    learning_rate: Option<f64>,
    /// 検証用に取り分ける割合
    #[arg(long)]
    validation_ratio: Option<f32>,
    /// 最終的な設定を書き出して終了する
    #[arg(long)]
    write_config: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.data_dir {
            config.dataset.data_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.model.output_path = output.clone();
        }
        if let Some(device) = self.device {
            config.device_type = device.into();
        }
        if let Some(epochs) = self.epochs {
            config.training.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if let Some(ratio) = self.validation_ratio {
            config.training.validation_ratio = ratio;
        }
    }
}

fn main() -> anyhow::Result<()> {
    coupling_detector_lib::init_logger();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    if args.write_config {
        config.save(&args.config)?;
        log::info!("設定ファイルを保存しました: {}", args.config.display());
        return Ok(());
    }

    config.display();
    let summary = train_with_config(&config)?;
    log::info!(
        "学習データ {} 枚 / 検証データ {} 枚 / パラメータ数 {}",
        summary.num_train,
        summary.num_valid,
        summary.num_params
    );
    println!("Model trained and saved to {}", summary.model_path.display());

    Ok(())
}
