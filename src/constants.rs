//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "forestwatch";

/// Lock file name created in the working directory during a run.
pub const LOCK_FILE_NAME: &str = ".forestwatch.lock";

/// Selection constants.
pub mod selection {
    /// Default selection file, relative to the current directory.
    pub const DEFAULT_FILE: &str = "selected_area.json";

    /// Maximum allowed selection radius in meters.
    pub const MAX_RADIUS_M: f64 = 1000.0;

    /// Meters per degree of latitude (and of longitude at the equator).
    pub const METERS_PER_DEGREE: f64 = 111_320.0;
}

/// Imagery catalog constants.
pub mod imagery {
    /// Sentinel-2 harmonized surface reflectance collection.
    pub const DEFAULT_COLLECTION: &str = "COPERNICUS/S2_HARMONIZED";

    /// Per-image cloud metric property.
    pub const CLOUD_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";

    /// Maximum cloud cover in percent (exclusive).
    pub const DEFAULT_CLOUD_THRESHOLD: f64 = 40.0;

    /// Half-width of the rolling time window in days.
    pub const DEFAULT_WINDOW_DAYS: i64 = 30;

    /// Red, green and blue bands, in tensor channel order.
    pub const DEFAULT_BANDS: [&str; 3] = ["B4", "B3", "B2"];
}

/// Export job constants.
pub mod export {
    /// Ground-sample scale of the exported raster in meters per pixel.
    pub const DEFAULT_SCALE_M: f64 = 10.0;

    /// Interval between job status checks in seconds.
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;

    /// Overall deadline for the export job in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

    /// Remote destination folder.
    pub const DEFAULT_FOLDER: &str = "Deforestation";

    /// Export description and file name prefix.
    pub const DEFAULT_NAME: &str = "current_image";
}

/// Remote storage constants.
pub mod storage {
    /// MIME type of exported rasters.
    pub const RASTER_MIME: &str = "image/tiff";

    /// Local raster file extension.
    pub const RASTER_EXTENSION: &str = "tif";
}

/// Local working directory layout.
pub mod work_dir {
    /// Default working directory, relative to the current directory.
    pub const DEFAULT: &str = "Deforestation_Local";

    /// Preview image written after preprocessing.
    pub const PREVIEW_FILE: &str = "processed_image.jpg";

    /// Locks older than this are considered abandoned.
    pub const STALE_LOCK_SECS: u64 = 6 * 3600;
}

/// Model input constants.
pub mod tensor {
    /// Model input width and height in pixels.
    pub const SIZE: u32 = 224;

    /// Number of color channels.
    pub const CHANNELS: usize = 3;

    /// Input tensor shape (batch, height, width, channels).
    pub const SHAPE: [usize; 4] = [1, SIZE as usize, SIZE as usize, CHANNELS];

    /// Half of the 8-bit range, used to map pixels to [-1, 1].
    pub const HALF_RANGE: f32 = 127.5;
}

/// Model constants.
pub mod model {
    /// Default ONNX model path.
    pub const DEFAULT_PATH: &str = "model.onnx";

    /// Default labels path.
    pub const DEFAULT_LABELS: &str = "labels.txt";

    /// Output holding the class probability vector.
    pub const DEFAULT_OUTPUT_KEY: &str = "sequential_7";
}

/// Retry policy defaults for network calls.
pub mod retry {
    /// Attempts including the first call.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

    /// Delay before the first retry in milliseconds.
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

    /// Upper bound for a single backoff delay in milliseconds.
    pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

    /// Backoff growth factor.
    pub const MULTIPLIER: u32 = 2;
}

/// HTTP client constants.
pub mod http {
    /// Connection timeout in seconds.
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;

    /// Request timeout in seconds (covers raster downloads).
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;

    /// Maximum response body length kept in error messages.
    pub const ERROR_BODY_LIMIT: usize = 512;
}

/// OAuth constants.
pub mod oauth {
    /// Authorization endpoint.
    pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

    /// Token endpoint.
    pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    /// Scopes for the imagery platform.
    pub const EARTH_ENGINE_SCOPES: &[&str] = &[
        "https://www.googleapis.com/auth/earthengine",
        "https://www.googleapis.com/auth/cloud-platform",
    ];

    /// Scopes for the storage service.
    pub const DRIVE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive.readonly"];

    /// Tokens expiring within this many seconds are treated as expired.
    pub const EXPIRY_SKEW_SECS: i64 = 60;

    /// Cached imagery platform credentials file name.
    pub const EARTH_ENGINE_CREDENTIALS: &str = "earthengine_credentials.json";

    /// Cached storage credentials file name.
    pub const DRIVE_CREDENTIALS: &str = "drive_credentials.json";
}

/// Earth Engine REST API constants.
pub mod earthengine {
    /// API base URL.
    pub const BASE_URL: &str = "https://earthengine.googleapis.com/v1";

    /// Export file format.
    pub const FILE_FORMAT: &str = "GEO_TIFF";
}

/// Google Drive API constants.
pub mod drive {
    /// Files endpoint.
    pub const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
    /// Files requested per listing page (the API maximum).
    pub const PAGE_SIZE: u32 = 1000;
    /// Listing fields, including the token for the next page.
    pub const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size)";
}

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f32 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f32 = 1.0;
}
