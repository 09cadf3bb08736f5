//! JSON envelope types for CLI output.
//!
//! With `--json` the final result (or the fatal error) is printed to stdout
//! as a single envelope so that scripts can consume the run outcome.

use crate::error::Error;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Envelope format version.
pub const SPEC_VERSION: &str = "1.0";

/// JSON envelope wrapping CLI output events.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct JsonEnvelope<T> {
    /// API specification version.
    pub spec_version: String,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event type.
    pub event: EventType,
    /// Event-specific payload.
    pub payload: T,
}

impl<T: Serialize> JsonEnvelope<T> {
    /// Create a new envelope with the current timestamp.
    pub fn new(event: EventType, payload: T) -> Self {
        Self {
            spec_version: SPEC_VERSION.to_string(),
            timestamp: Utc::now(),
            event,
            payload,
        }
    }

    /// Serialize to a single line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Event types for JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Classification finished.
    Result,
    /// Run failed.
    Error,
    /// Run was interrupted.
    Cancelled,
}

/// Payload of a `result` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Winning label.
    pub label: String,
    /// Probability of the label.
    pub confidence: f32,
    /// Class index.
    pub index: usize,
    /// Region center latitude.
    pub latitude: f64,
    /// Region center longitude.
    pub longitude: f64,
    /// Region radius in meters.
    pub radius_m: f64,
    /// First day of the imagery window.
    pub window_start: NaiveDate,
    /// Last day of the imagery window.
    pub window_end: NaiveDate,
    /// Number of source images in the composite.
    pub source_images: usize,
    /// Downloaded raster.
    pub raster: PathBuf,
    /// Preview image, if written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PathBuf>,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code (`snake_case` identifier).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl From<&Error> for ErrorPayload {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
