//! Remote export jobs: submission, polling and the resulting file locator.

mod controller;
mod job;

pub use controller::{ExportJobController, ExportOptions, ExportService};
pub use job::{ArtifactLocator, ExportJob, ExportRequest, JobState, JobStatus};
