//! Submits export jobs and waits for them to finish.

use super::job::{ArtifactLocator, ExportJob, ExportRequest, JobState, JobStatus};
use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::imagery::CompositeImage;
use crate::output::progress::{
    abandon_progress, create_export_spinner, finish_progress, set_progress_message,
};
use crate::utils::clock::Clock;
use crate::utils::retry::{RetryPolicy, with_retry};
use indicatif::ProgressBar;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remote export capability.
#[allow(async_fn_in_trait)]
pub trait ExportService {
    /// Start an export and return the job identifier.
    async fn submit(&self, request: &ExportRequest) -> Result<String>;

    /// Current status of `job`.
    async fn status(&self, job: &ExportJob) -> Result<JobStatus>;

    /// Ask the service to stop `job`.
    async fn cancel(&self, job: &ExportJob) -> Result<()>;
}

/// Export destination and polling behavior.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Destination folder in remote storage.
    pub folder: String,
    /// Meters per pixel.
    pub scale_m: f64,
    /// Wait between status checks.
    pub poll_interval: Duration,
    /// Overall deadline measured from submission.
    pub timeout: Option<Duration>,
    /// Retry policy for status checks.
    pub retry: RetryPolicy,
    /// Show a spinner while waiting.
    pub show_progress: bool,
}

/// Drives one export job from submission to a terminal state.
#[derive(Debug)]
pub struct ExportJobController<'a, S, C> {
    service: &'a S,
    clock: &'a C,
    options: ExportOptions,
}

impl<'a, S: ExportService, C: Clock> ExportJobController<'a, S, C> {
    /// Controller using `service` for remote calls and `clock` for waits.
    pub const fn new(service: &'a S, clock: &'a C, options: ExportOptions) -> Self {
        Self {
            service,
            clock,
            options,
        }
    }

    /// Export `image` clipped to `region` under `name` and wait for it.
    ///
    /// A job that ends in any state other than completed fails with
    /// [`Error::ExportFailed`] carrying the raw status payload. Deadline
    /// expiry and cancellation also cancel the remote job.
    pub async fn run_export(
        &self,
        image: &CompositeImage,
        region: &Region,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ArtifactLocator> {
        let request = ExportRequest {
            image: image.handle.clone(),
            description: name.to_string(),
            folder: self.options.folder.clone(),
            file_name_prefix: name.to_string(),
            scale_m: self.options.scale_m,
            bounds: region.bounds(),
        };

        let id = self.service.submit(&request).await?;
        let mut job = ExportJob::submitted(id, &request);
        info!(
            "Export job {} submitted to folder '{}'",
            job.id, job.folder
        );

        let spinner = create_export_spinner(name, self.options.show_progress);
        let outcome = self.poll_until_terminal(&mut job, spinner.as_ref(), cancel).await;

        match outcome {
            Ok(status) if status.state == JobState::Completed => {
                finish_progress(spinner, "completed");
                info!("Export job {} completed", job.id);
                Ok(ArtifactLocator {
                    name: job.file_name_prefix,
                    description: job.description,
                })
            }
            Ok(status) => {
                finish_progress(spinner, "failed");
                Err(Error::ExportFailed {
                    status: status.detail.to_string(),
                })
            }
            Err(err) => {
                abandon_progress(spinner);
                if matches!(err, Error::ExportTimeout { .. } | Error::Cancelled) {
                    self.cancel_remote(&job).await;
                }
                Err(err)
            }
        }
    }

    async fn poll_until_terminal(
        &self,
        job: &mut ExportJob,
        spinner: Option<&ProgressBar>,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        let started = self.clock.now();
        let service = self.service;

        loop {
            let current: &ExportJob = job;
            let status = with_retry(&self.options.retry, self.clock, cancel, "export status", move || {
                service.status(current)
            })
            .await?;

            if job.advance(status.state) {
                debug!(job = %job.id, state = %job.state(), "Export state changed");
            }
            set_progress_message(spinner, &job.state().to_string());

            if job.state().is_terminal() {
                return Ok(status);
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            let wait = match self.options.timeout {
                Some(timeout) if elapsed >= timeout => {
                    return Err(Error::ExportTimeout {
                        job_id: job.id.clone(),
                        elapsed_secs: elapsed.as_secs(),
                    });
                }
                Some(timeout) => self.options.poll_interval.min(timeout - elapsed),
                None => self.options.poll_interval,
            };

            tokio::select! {
                () = self.clock.sleep(wait) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
    }

    async fn cancel_remote(&self, job: &ExportJob) {
        match self.service.cancel(job).await {
            Ok(()) => info!("Cancelled export job {}", job.id),
            Err(e) => warn!("Failed to cancel export job {}: {e}", job.id),
        }
    }
}
