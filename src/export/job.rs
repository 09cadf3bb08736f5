//! Export job lifecycle.

use crate::geometry::Bounds;
use crate::imagery::ImageHandle;
use tracing::warn;

/// Lifecycle state of a remote export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Accepted but not yet started.
    Submitted,
    /// Running on the server.
    Active,
    /// Finished and the file was written.
    Completed,
    /// Stopped without producing a file.
    Failed,
}

impl JobState {
    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Active => 1,
            Self::Completed | Self::Failed => 2,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Submitted => "SUBMITTED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One status report from the export service.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    /// Mapped lifecycle state.
    pub state: JobState,
    /// Raw status payload as returned by the service.
    pub detail: serde_json::Value,
}

/// What to export and where.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// Image to materialize.
    pub image: ImageHandle,
    /// Human-readable task description.
    pub description: String,
    /// Destination folder in remote storage.
    pub folder: String,
    /// Output file name prefix.
    pub file_name_prefix: String,
    /// Meters per pixel.
    pub scale_m: f64,
    /// Clip bounds.
    pub bounds: Bounds,
}

/// A submitted export job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    /// Service-assigned identifier.
    pub id: String,
    /// Task description.
    pub description: String,
    /// Destination folder.
    pub folder: String,
    /// Output file name prefix.
    pub file_name_prefix: String,
    /// Meters per pixel.
    pub scale_m: f64,
    /// Clip bounds.
    pub bounds: Bounds,
    state: JobState,
}

impl ExportJob {
    /// Job just accepted for `request` under `id`.
    pub fn submitted(id: impl Into<String>, request: &ExportRequest) -> Self {
        Self {
            id: id.into(),
            description: request.description.clone(),
            folder: request.folder.clone(),
            file_name_prefix: request.file_name_prefix.clone(),
            scale_m: request.scale_m,
            bounds: request.bounds,
            state: JobState::Submitted,
        }
    }

    /// Current state.
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`, ignoring reports that would go backwards.
    ///
    /// Returns whether the state changed.
    pub fn advance(&mut self, next: JobState) -> bool {
        if next == self.state {
            return false;
        }
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            warn!(
                job = %self.id,
                "Ignoring export state {next} reported after {}", self.state
            );
            return false;
        }
        self.state = next;
        true
    }
}

/// Where the exported file can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    /// File name prefix to search for.
    pub name: String,
    /// Export task description.
    pub description: String,
}
