//! 学習データの読み込み
//!
//! `<name>.jpeg` と LabelMe 形式の `<name>.json` のペアからサンプルを作成します。

pub mod annotation;
pub mod convert;
pub mod image_prep;
pub mod loader;

pub use annotation::{AnnotationError, LabelmeAnnotation, LabelmeShape};
pub use convert::{convert_all_jpegs_in_directory, convert_jpeg_to_png, ConversionReport};
pub use image_prep::{image_to_chw, load_rgb_image, resize_rgb, Normalization};
pub use loader::{find_pairs, load_sample, load_samples, CouplingSample, SamplePair};
