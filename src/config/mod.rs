//! Configuration loading and management.

mod file;
mod paths;
mod types;
mod validate;

pub use file::{load_config_file, save_config};
pub use paths::{config_dir, config_file_path, credentials_path};
pub use types::{
    AuthConfig, Config, EarthEngineConfig, ExportConfig, MatchPolicy, ModelConfig, OutputConfig,
    RetryConfig, SelectionConfig, StorageConfig,
};
pub use validate::{validate_config, validate_model_config};
