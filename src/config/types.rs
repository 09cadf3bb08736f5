//! Configuration type definitions.

use crate::constants::{export, imagery, model, retry, selection, work_dir};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Area selection settings.
    pub selection: SelectionConfig,

    /// Imagery platform settings.
    pub earth_engine: EarthEngineConfig,

    /// Export job settings.
    pub export: ExportConfig,

    /// Remote storage settings.
    pub storage: StorageConfig,

    /// OAuth client settings.
    pub auth: AuthConfig,

    /// Classification model settings.
    pub model: ModelConfig,

    /// Network retry settings.
    pub retry: RetryConfig,

    /// Local output settings.
    pub output: OutputConfig,
}

/// Area selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Path to the saved selection JSON.
    pub path: PathBuf,

    /// Maximum allowed radius in meters.
    pub max_radius_m: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(selection::DEFAULT_FILE),
            max_radius_m: selection::MAX_RADIUS_M,
        }
    }
}

/// Imagery platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarthEngineConfig {
    /// Cloud project used for API calls.
    pub project: Option<String>,

    /// Image collection to query.
    pub collection: String,

    /// Bands to keep, in tensor channel order.
    pub bands: Vec<String>,

    /// Maximum cloud cover in percent.
    pub cloud_threshold: f64,

    /// Half-width of the time window in days.
    pub window_days: i64,

    /// Cached credentials file (defaults to the config directory).
    pub credentials: Option<PathBuf>,
}

impl Default for EarthEngineConfig {
    fn default() -> Self {
        Self {
            project: None,
            collection: imagery::DEFAULT_COLLECTION.to_string(),
            bands: imagery::DEFAULT_BANDS.iter().map(ToString::to_string).collect(),
            cloud_threshold: imagery::DEFAULT_CLOUD_THRESHOLD,
            window_days: imagery::DEFAULT_WINDOW_DAYS,
            credentials: None,
        }
    }
}

/// Export job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Remote destination folder.
    pub folder: String,

    /// Export description and file name prefix.
    pub name: String,

    /// Ground-sample scale in meters per pixel.
    pub scale_m: f64,

    /// Seconds between status checks.
    pub poll_interval_secs: u64,

    /// Overall deadline in seconds (0 disables the deadline).
    pub timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            folder: export::DEFAULT_FOLDER.to_string(),
            name: export::DEFAULT_NAME.to_string(),
            scale_m: export::DEFAULT_SCALE_M,
            poll_interval_secs: export::DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: export::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// How to pick a file when several remote files match the export name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Take the first file in the service's listing order.
    #[default]
    First,
    /// Fail when more than one file matches.
    Fail,
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// Remote storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cached credentials file (defaults to the config directory).
    pub credentials: Option<PathBuf>,

    /// Policy when several files match.
    pub on_multiple_matches: MatchPolicy,
}

/// OAuth client settings shared by both sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client identifier.
    pub client_id: Option<String>,

    /// OAuth client secret.
    pub client_secret: Option<String>,
}

/// Classification model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the ONNX model file.
    pub path: PathBuf,

    /// Path to the labels file.
    pub labels: PathBuf,

    /// Output holding the class probability vector.
    pub output_key: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(model::DEFAULT_PATH),
            labels: PathBuf::from(model::DEFAULT_LABELS),
            output_key: model::DEFAULT_OUTPUT_KEY.to_string(),
        }
    }
}

/// Network retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first call.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay between attempts in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: retry::DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: retry::DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// Local output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Working directory for the raster and preview.
    pub work_dir: PathBuf,

    /// Write the processed preview image.
    pub save_preview: bool,

    /// Age in seconds after which a leftover lock is removed.
    pub stale_lock_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(work_dir::DEFAULT),
            save_preview: true,
            stale_lock_secs: work_dir::STALE_LOCK_SECS,
        }
    }
}
