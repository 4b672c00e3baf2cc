pub mod inference;
pub mod ml_model;
pub mod training;

pub use inference::CouplingDetector;
pub use ml_model::{CouplingRegressor, ModelConfig, CONV_CHANNELS, IMAGE_SIZE};
pub use training::{
    fit, model_config, model_to_bytes, train_model, train_with_config, CouplingBatch,
    CouplingBatcher, CouplingDataset, TrainingSummary,
};
