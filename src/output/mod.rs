//! Console output: progress indicators, result reporting and previews.

pub mod json_envelope;
mod preview;
pub mod progress;

pub use json_envelope::{ErrorPayload, EventType, JsonEnvelope, ResultPayload};
pub use preview::save_preview;
