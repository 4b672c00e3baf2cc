//! ディレクトリ内のJPEG画像をPNGに変換する

use std::path::PathBuf;

use clap::Parser;
use coupling_detector_lib::dataset::convert_all_jpegs_in_directory;

#[derive(Parser, Debug)]
#[command(name = "convert_jpeg", about = "Convert every *.jpeg in a directory to *.png")]
struct Args {
    /// 対象ディレクトリ
    #[arg(default_value = "data")]
    directory: PathBuf,
}

fn main() -> anyhow::Result<()> {
    coupling_detector_lib::init_logger();
    let args = Args::parse();

    let report = convert_all_jpegs_in_directory(&args.directory)?;
    log::info!(
        "変換 {} 件 / 失敗 {} 件",
        report.converted.len(),
        report.failed.len()
    );

    Ok(())
}
