//! カプラー検出モデルの学習ライブラリ
//!
//! 画像と LabelMe 形式のアノテーションのペアからカプラー中心のx座標を回帰する
//! CNN を学習し、1ファイルのモデルとして保存します。

#![recursion_limit = "256"]
pub mod dataset;
pub mod model;
#[cfg(feature = "ml")]
pub mod ml;

/// バイナリ共通のロガー初期化（`RUST_LOG` がなければ info）
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
