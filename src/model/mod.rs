pub mod config;
pub mod model_metadata;
pub mod model_storage;

pub use config::{AppConfig, DatasetSettings, DeviceType, ModelSettings, TrainingSettings};
pub use model_metadata::ModelMetadata;
pub use model_storage::{
    artifact_path, load_metadata, load_model_binary, load_model_with_metadata,
    print_metadata_info, save_model_with_metadata,
};
