//! Pipeline orchestration.

mod orchestrator;

pub use orchestrator::{Pipeline, PipelineOutcome, PipelineSettings, Stage};
