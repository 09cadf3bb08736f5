//! Error types for forestwatch.

use std::path::PathBuf;

/// Result type alias for forestwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for forestwatch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// No saved selection exists.
    #[error("no selected area found at '{path}' (run 'forestwatch select' first)")]
    SelectionNotFound {
        /// Path where the selection was expected.
        path: PathBuf,
    },

    /// The saved selection does not describe a valid region.
    #[error("invalid selected area in '{path}': {reason}")]
    SelectionInvalid {
        /// Path to the selection file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// Region radius is outside the allowed range.
    #[error("radius {radius} m is outside the allowed range (0, {max}] m")]
    InvalidRadius {
        /// Requested radius in meters.
        radius: f64,
        /// Maximum allowed radius in meters.
        max: f64,
    },

    /// Invalid latitude value.
    #[error("invalid latitude: {value} (must be -90.0 to 90.0)")]
    InvalidLatitude {
        /// Invalid latitude value.
        value: f64,
    },

    /// Invalid longitude value.
    #[error("invalid longitude: {value} (must be -180.0 to 180.0)")]
    InvalidLongitude {
        /// Invalid longitude value.
        value: f64,
    },

    /// The catalog query matched no images.
    #[error("no images found for {start} to {end} with cloud cover below {cloud_threshold}%")]
    NoImagery {
        /// Window start date.
        start: chrono::NaiveDate,
        /// Window end date.
        end: chrono::NaiveDate,
        /// Cloud-cover threshold in percent.
        cloud_threshold: f64,
    },

    /// The export job reached a terminal state other than completed.
    #[error("export failed: {status}")]
    ExportFailed {
        /// Remote status payload, verbatim.
        status: String,
    },

    /// The export job did not complete before the deadline.
    #[error("export job '{job_id}' did not complete within {elapsed_secs}s")]
    ExportTimeout {
        /// Remote job identifier.
        job_id: String,
        /// Seconds spent waiting.
        elapsed_secs: u64,
    },

    /// The run was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// No remote file matched the export name.
    #[error("file '{pattern}' not found in remote storage")]
    ArtifactNotFound {
        /// Name pattern that was searched for.
        pattern: String,
    },

    /// More than one remote file matched and the policy forbids guessing.
    #[error("{count} files match '{pattern}' in remote storage")]
    AmbiguousArtifact {
        /// Name pattern that was searched for.
        pattern: String,
        /// Number of matching files.
        count: usize,
    },

    /// Download failed.
    #[error("failed to download from '{url}'")]
    DownloadFailed {
        /// URL that failed.
        url: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Downloaded file size differs from the remote size.
    #[error("downloaded {actual} bytes to '{path}', expected {expected}")]
    DownloadIncomplete {
        /// Local file path.
        path: PathBuf,
        /// Size reported by the remote service.
        expected: u64,
        /// Size written locally.
        actual: u64,
    },

    /// HTTP request could not be sent or its response could not be read.
    #[error("request to '{url}' failed")]
    Request {
        /// Request URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Remote service answered with a non-success status.
    #[error("HTTP {status} from '{url}': {body}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Request URL.
        url: String,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Remote response did not have the expected shape.
    #[error("unexpected response from {service}: {reason}")]
    RemoteResponse {
        /// Service name.
        service: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// Interactive authorization failed.
    #[error("authorization failed: {reason}")]
    Authorization {
        /// Description of the failure.
        reason: String,
    },

    /// Failed to read cached credentials.
    #[error("failed to read credentials file '{path}'")]
    CredentialsRead {
        /// Path to the credentials file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to write cached credentials.
    #[error("failed to write credentials file '{path}'")]
    CredentialsWrite {
        /// Path to the credentials file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to decode raster file.
    #[error("failed to read raster '{path}'")]
    RasterRead {
        /// Path to the raster file.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: tiff::TiffError,
    },

    /// Raster content cannot be used as model input.
    #[error("unsupported raster '{path}': {reason}")]
    RasterFormat {
        /// Path to the raster file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// Failed to encode or write an image.
    #[error("failed to write image '{path}'")]
    ImageWrite {
        /// Path to the image file.
        path: PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// Model file does not exist.
    #[error("model file does not exist: {path}")]
    ModelFileNotFound {
        /// Path to the missing model file.
        path: PathBuf,
    },

    /// Labels file does not exist.
    #[error("labels file does not exist: {path}")]
    LabelsFileNotFound {
        /// Path to the missing labels file.
        path: PathBuf,
    },

    /// Failed to read labels file.
    #[error("failed to read labels file '{path}'")]
    LabelsRead {
        /// Path to the labels file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to initialize the inference session.
    #[error("failed to build classifier: {reason}")]
    ClassifierBuild {
        /// Description of the build failure.
        reason: String,
    },

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Inference output does not match the label vocabulary.
    #[error(
        "unexpected model output for key '{key}': expected {expected} values, got {}",
        .actual.map_or_else(|| "no such output".to_string(), |n| n.to_string())
    )]
    UnexpectedOutputShape {
        /// Output key that was looked up.
        key: String,
        /// Vocabulary size.
        expected: usize,
        /// Vector length, or `None` if the key was absent.
        actual: Option<usize>,
    },

    /// Another run holds the working directory lock.
    #[error("another run is in progress (lock file: {path})")]
    FileLocked {
        /// Path to the lock file.
        path: PathBuf,
    },

    /// Failed to create lock file.
    #[error("failed to create lock file '{path}'")]
    LockCreate {
        /// Path to the lock file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove lock file.
    #[error("failed to remove lock file '{path}'")]
    LockRemove {
        /// Path to the lock file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Internal error (for unexpected failures).
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Whether retrying the failed call may succeed.
    ///
    /// Only connection-level failures (including a download cut off
    /// mid-body) and HTTP 429/5xx responses qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { source, .. } => transport_is_transient(source),
            Self::DownloadFailed { source, .. } => source
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|e| transport_is_transient(e) || e.is_body()),
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Stable `snake_case` identifier for machine-readable output.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::ConfigDirNotFound
            | Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigValidation { .. }
            | Self::ConfigWrite { .. }
            | Self::ConfigSerialize { .. } => "config",
            Self::SelectionNotFound { .. } => "selection_not_found",
            Self::SelectionInvalid { .. }
            | Self::InvalidRadius { .. }
            | Self::InvalidLatitude { .. }
            | Self::InvalidLongitude { .. } => "selection_invalid",
            Self::NoImagery { .. } => "no_imagery",
            Self::ExportFailed { .. } => "export_failed",
            Self::ExportTimeout { .. } => "export_timeout",
            Self::Cancelled => "cancelled",
            Self::ArtifactNotFound { .. } => "artifact_not_found",
            Self::AmbiguousArtifact { .. } => "ambiguous_artifact",
            Self::DownloadFailed { .. } | Self::DownloadIncomplete { .. } => "download_failed",
            Self::Request { .. } | Self::HttpStatus { .. } | Self::RemoteResponse { .. } => {
                "remote_service"
            }
            Self::Authorization { .. }
            | Self::CredentialsRead { .. }
            | Self::CredentialsWrite { .. } => "authorization",
            Self::RasterRead { .. } | Self::RasterFormat { .. } => "raster",
            Self::ImageWrite { .. } => "image_write",
            Self::ModelFileNotFound { .. }
            | Self::LabelsFileNotFound { .. }
            | Self::LabelsRead { .. }
            | Self::ClassifierBuild { .. } => "model",
            Self::Inference { .. } => "inference",
            Self::UnexpectedOutputShape { .. } => "unexpected_output_shape",
            Self::FileLocked { .. } | Self::LockCreate { .. } | Self::LockRemove { .. } => {
                "locked"
            }
            Self::Internal { .. } => "internal",
        }
    }
}

fn transport_is_transient(source: &reqwest::Error) -> bool {
    source.is_timeout() || source.is_connect() || source.is_request()
}
