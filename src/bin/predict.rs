//! 学習済みモデルでカプラー中心のx座標を予測する

use std::path::PathBuf;

use clap::Parser;
use coupling_detector_lib::ml::CouplingDetector;
use coupling_detector_lib::model::print_metadata_info;

type InferenceBackend = burn_ndarray::NdArray<f32>;

#[derive(Parser, Debug)]
#[command(name = "predict", about = "Predict the coupling center x-coordinate for images")]
struct Args {
    /// モデルファイル (.tar.gz)
    #[arg(long, default_value = "coupling_detector_model.tar.gz")]
    model: PathBuf,
    /// メタデータを表示する
    #[arg(long)]
    info: bool,
    /// 予測する画像
    images: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    coupling_detector_lib::init_logger();
    let args = Args::parse();

    let detector =
        CouplingDetector::<InferenceBackend>::load(&args.model, burn_ndarray::NdArrayDevice::Cpu)?;
    if args.info {
        print_metadata_info(detector.metadata());
    }

    for path in &args.images {
        match detector.predict_image(path) {
            Ok(x) => println!("{}\t{:.2}", path.display(), x),
            Err(e) => log::error!("予測失敗 {}: {:#}", path.display(), e),
        }
    }

    Ok(())
}
