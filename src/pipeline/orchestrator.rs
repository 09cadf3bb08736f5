//! End-to-end run: selection to prediction.

use crate::config::{Config, MatchPolicy};
use crate::constants::storage::RASTER_EXTENSION;
use crate::constants::work_dir::PREVIEW_FILE;
use crate::error::Result;
use crate::export::{ExportJobController, ExportOptions, ExportService};
use crate::geometry::{Region, SelectionFile};
use crate::imagery::{ImageResolver, ImageryCatalog};
use crate::inference::{Classifier, InferenceService, PredictionResult};
use crate::output::save_preview;
use crate::preprocess::preprocess;
use crate::storage::{ArtifactFetcher, LocalRaster, StorageService};
use crate::utils::clock::Clock;
use crate::utils::date::TimeWindow;
use crate::utils::retry::{RetryPolicy, with_retry};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pipeline stage, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading the saved selection.
    Selection,
    /// Querying the catalog for a composite.
    Imagery,
    /// Running the export job.
    Export,
    /// Downloading the exported raster.
    Download,
    /// Building the model input.
    Preprocess,
    /// Running the model.
    Classify,
}

impl Stage {
    const fn step(self) -> u8 {
        match self {
            Self::Selection => 1,
            Self::Imagery => 2,
            Self::Export => 3,
            Self::Download => 4,
            Self::Preprocess => 5,
            Self::Classify => 6,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Selection => "selection",
            Self::Imagery => "imagery",
            Self::Export => "export",
            Self::Download => "download",
            Self::Preprocess => "preprocess",
            Self::Classify => "classify",
        };
        f.write_str(name)
    }
}

/// Settings for one run, resolved from configuration and CLI overrides.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Image collection identifier.
    pub collection: String,
    /// Bands in channel order.
    pub bands: Vec<String>,
    /// Cloud cover limit in percent.
    pub cloud_threshold: f64,
    /// Half-width of the time window in days.
    pub window_days: i64,
    /// Export description and file name prefix.
    pub export_name: String,
    /// Export destination and polling.
    pub export: ExportOptions,
    /// Handling of multiple remote matches.
    pub match_policy: MatchPolicy,
    /// Local working directory.
    pub work_dir: PathBuf,
    /// Write the preview image.
    pub save_preview: bool,
    /// Retry policy for catalog queries and downloads.
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    /// Settings taken from `config`.
    pub fn from_config(config: &Config, show_progress: bool) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let timeout = (config.export.timeout_secs > 0)
            .then_some(Duration::from_secs(config.export.timeout_secs));

        Self {
            collection: config.earth_engine.collection.clone(),
            bands: config.earth_engine.bands.clone(),
            cloud_threshold: config.earth_engine.cloud_threshold,
            window_days: config.earth_engine.window_days,
            export_name: config.export.name.clone(),
            export: ExportOptions {
                folder: config.export.folder.clone(),
                scale_m: config.export.scale_m,
                poll_interval: Duration::from_secs(config.export.poll_interval_secs),
                timeout,
                retry,
                show_progress,
            },
            match_policy: config.storage.on_multiple_matches,
            work_dir: config.output.work_dir.clone(),
            save_preview: config.output.save_preview,
            retry,
        }
    }

    /// Local path of the downloaded raster.
    pub fn raster_path(&self) -> PathBuf {
        self.work_dir
            .join(format!("{}.{RASTER_EXTENSION}", self.export_name))
    }

    /// Local path of the preview image.
    pub fn preview_path(&self) -> PathBuf {
        self.work_dir.join(PREVIEW_FILE)
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Region that was classified.
    pub region: Region,
    /// Imagery window.
    pub window: TimeWindow,
    /// Number of images in the composite.
    pub source_images: usize,
    /// Downloaded raster.
    pub raster: LocalRaster,
    /// Preview image, if one was written.
    pub preview: Option<PathBuf>,
    /// Classification result.
    pub prediction: PredictionResult,
}

/// The collaborators of one run.
#[derive(Debug)]
pub struct Pipeline<'a, Cat, Exp, Sto, Inf, Clk> {
    /// Saved area selection.
    pub selection: &'a SelectionFile,
    /// Imagery catalog.
    pub catalog: &'a Cat,
    /// Export service.
    pub exporter: &'a Exp,
    /// Remote storage.
    pub storage: &'a Sto,
    /// Model and labels.
    pub classifier: &'a Classifier<Inf>,
    /// Time source for waits.
    pub clock: &'a Clk,
    /// Run settings.
    pub settings: PipelineSettings,
}

fn announce(stage: Stage, message: &str) {
    info!("[{}/6] {message}", stage.step());
}

fn checked<T>(stage: Stage, result: Result<T>) -> Result<T> {
    if result.is_err() {
        error!("Pipeline stopped at the {stage} stage");
    }
    result
}

impl<Cat, Exp, Sto, Inf, Clk> Pipeline<'_, Cat, Exp, Sto, Inf, Clk>
where
    Cat: ImageryCatalog,
    Exp: ExportService,
    Sto: StorageService,
    Inf: InferenceService,
    Clk: Clock,
{
    /// Run all stages in order for the window around `today`.
    ///
    /// The first failing stage ends the run and its error is returned as is.
    pub async fn run(&self, today: NaiveDate, cancel: &CancellationToken) -> Result<PipelineOutcome> {
        let settings = &self.settings;

        announce(Stage::Selection, "Loading selected area");
        let region = checked(Stage::Selection, self.selection.load())?;
        info!("Area: {region}");

        let window = TimeWindow::around(today, settings.window_days);
        announce(
            Stage::Imagery,
            &format!(
                "Searching imagery from {window} with cloud cover below {}%",
                settings.cloud_threshold
            ),
        );
        let resolver = ImageResolver::new(self.catalog, &settings.collection, settings.bands.clone());
        let composite = {
            let resolver = &resolver;
            let region = &region;
            checked(
                Stage::Imagery,
                with_retry(&settings.retry, self.clock, cancel, "imagery query", move || {
                    resolver.resolve(region, window, settings.cloud_threshold)
                })
                .await,
            )?
        };

        announce(Stage::Export, "Exporting composite");
        let controller =
            ExportJobController::new(self.exporter, self.clock, settings.export.clone());
        let locator = checked(
            Stage::Export,
            controller
                .run_export(&composite, &region, &settings.export_name, cancel)
                .await,
        )?;

        announce(Stage::Download, "Downloading exported raster");
        let fetcher = ArtifactFetcher::new(self.storage, settings.match_policy);
        let destination = settings.raster_path();
        let raster = {
            let fetcher = &fetcher;
            let locator = &locator;
            let destination = destination.as_path();
            checked(
                Stage::Download,
                with_retry(&settings.retry, self.clock, cancel, "download", move || {
                    fetcher.fetch(locator, destination)
                })
                .await,
            )?
        };
        info!("Saved {} ({} bytes)", raster.path.display(), raster.size);

        announce(Stage::Preprocess, "Preparing model input");
        let tensor = checked(Stage::Preprocess, preprocess(&raster.path))?;

        let preview = if settings.save_preview {
            let path = settings.preview_path();
            match save_preview(&tensor, &path) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!("Could not save preview: {e}");
                    None
                }
            }
        } else {
            None
        };

        announce(Stage::Classify, "Classifying");
        let prediction = checked(Stage::Classify, self.classifier.classify(&tensor))?;
        info!("Prediction: {prediction}");

        Ok(PipelineOutcome {
            region,
            window,
            source_images: composite.source_count,
            raster,
            preview,
            prediction,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::export::{ExportJob, ExportRequest, JobState, JobStatus};
    use crate::http::{REFUSED_URL, refused_connection};
    use crate::imagery::{CatalogQuery, ImageHandle, ImageSet};
    use crate::preprocess::{InputTensor, raster::write_test_raster};
    use crate::storage::RemoteFile;
    use crate::utils::clock::ManualClock;
    use serde_json::json;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    struct CloudCatalog(Vec<f64>);

    impl ImageryCatalog for CloudCatalog {
        async fn query(&self, query: &CatalogQuery<'_>) -> Result<ImageSet> {
            let len = self.0.iter().filter(|&&c| c < query.cloud_max).count();
            Ok(ImageSet {
                handle: ImageHandle::new(json!("collection")),
                len,
            })
        }

        fn median(&self, set: &ImageSet) -> Result<ImageHandle> {
            Ok(set.handle.clone())
        }

        fn select_bands(&self, image: &ImageHandle, _bands: &[String]) -> Result<ImageHandle> {
            Ok(image.clone())
        }
    }

    /// Export that stays active for `active_polls` checks, then ends in `end`.
    struct PollingExport {
        active_polls: usize,
        end: JobState,
        submits: Cell<u32>,
        checks: Cell<usize>,
    }

    impl PollingExport {
        fn new(active_polls: usize, end: JobState) -> Self {
            Self {
                active_polls,
                end,
                submits: Cell::new(0),
                checks: Cell::new(0),
            }
        }
    }

    impl ExportService for PollingExport {
        async fn submit(&self, _request: &ExportRequest) -> Result<String> {
            self.submits.set(self.submits.get() + 1);
            Ok("operations/1".to_string())
        }

        async fn status(&self, _job: &ExportJob) -> Result<JobStatus> {
            let n = self.checks.get();
            self.checks.set(n + 1);
            let state = if n < self.active_polls {
                JobState::Active
            } else {
                self.end
            };
            Ok(JobStatus {
                state,
                detail: json!({"state": state.to_string()}),
            })
        }

        async fn cancel(&self, _job: &ExportJob) -> Result<()> {
            Ok(())
        }
    }

    /// Storage serving one local file.
    struct FileStorage {
        source: PathBuf,
        downloads: Cell<u32>,
        /// Downloads that fail with a refused connection before one succeeds.
        refused: Cell<u32>,
    }

    impl StorageService for FileStorage {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn find(&self, name_pattern: &str, _mime_type: &str) -> Result<Vec<RemoteFile>> {
            Ok(vec![RemoteFile {
                id: "file-1".to_string(),
                name: format!("{name_pattern}.tif"),
                mime_type: "image/tiff".to_string(),
                size: Some(std::fs::metadata(&self.source)?.len()),
            }])
        }

        async fn download(&self, _file: &RemoteFile, destination: &Path) -> Result<()> {
            self.downloads.set(self.downloads.get() + 1);
            if self.refused.get() > 0 {
                self.refused.set(self.refused.get() - 1);
                return Err(Error::DownloadFailed {
                    url: REFUSED_URL.to_string(),
                    source: Box::new(refused_connection().await),
                });
            }
            std::fs::copy(&self.source, destination)?;
            Ok(())
        }
    }

    struct FixedModel(Vec<f32>);

    impl InferenceService for FixedModel {
        fn infer(&self, tensor: &InputTensor) -> Result<HashMap<String, Vec<f32>>> {
            assert_eq!(tensor.shape(), [1, 224, 224, 3]);
            assert!(tensor.data().iter().all(|v| (-1.0..=1.0).contains(v)));
            Ok(HashMap::from([("sequential_7".to_string(), self.0.clone())]))
        }
    }

    struct Fixture {
        _dir: TempDir,
        selection: SelectionFile,
        storage: FileStorage,
        classifier: Classifier<FixedModel>,
        settings: PipelineSettings,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();

        let selection = SelectionFile::new(dir.path().join("selected_area.json"), 1000.0);
        selection
            .save(&Region::new(-14.235, -51.9253, 500.0, 1000.0).unwrap())
            .unwrap();

        let remote = dir.path().join("remote.tif");
        write_test_raster(&remote, 40, 30, |x, y, band| {
            u16::try_from(200 + x * 13 + y * 7 + u32::try_from(band).unwrap() * 90).unwrap()
        });

        let classifier = Classifier::new(
            FixedModel(vec![0.1, 0.7, 0.2]),
            vec!["Forest".into(), "Deforestation".into(), "Other".into()],
            "sequential_7",
        )
        .unwrap();

        let mut config = Config::default();
        config.output.work_dir = dir.path().join("Deforestation_Local");
        let mut settings = PipelineSettings::from_config(&config, false);
        settings.retry = RetryPolicy::none();
        settings.export.retry = RetryPolicy::none();

        Fixture {
            selection,
            storage: FileStorage {
                source: remote,
                downloads: Cell::new(0),
                refused: Cell::new(0),
            },
            classifier,
            settings,
            _dir: dir,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_prediction() {
        let fx = fixture();
        let catalog = CloudCatalog(vec![10.0, 25.0, 38.0]);
        let exporter = PollingExport::new(2, JobState::Completed);
        let clock = ManualClock::new();
        let pipeline = Pipeline {
            selection: &fx.selection,
            catalog: &catalog,
            exporter: &exporter,
            storage: &fx.storage,
            classifier: &fx.classifier,
            clock: &clock,
            settings: fx.settings.clone(),
        };

        let outcome = pipeline.run(today(), &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.source_images, 3);
        assert_eq!(exporter.checks.get(), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(40));
        assert_eq!(outcome.prediction.label, "Deforestation");
        assert_eq!(outcome.prediction.confidence, 0.7);
        assert_eq!(outcome.window.start, NaiveDate::from_ymd_opt(2024, 5, 16).unwrap());
        assert_eq!(outcome.raster.path, fx.settings.raster_path());
        assert_eq!(
            outcome.raster.size,
            std::fs::metadata(&fx.storage.source).unwrap().len()
        );
        assert!(outcome.preview.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_dropped_download_connection_is_retried() {
        let mut fx = fixture();
        fx.settings.retry = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        };
        fx.storage.refused.set(1);
        let catalog = CloudCatalog(vec![10.0]);
        let exporter = PollingExport::new(0, JobState::Completed);
        let clock = ManualClock::new();
        let pipeline = Pipeline {
            selection: &fx.selection,
            catalog: &catalog,
            exporter: &exporter,
            storage: &fx.storage,
            classifier: &fx.classifier,
            clock: &clock,
            settings: fx.settings.clone(),
        };

        let outcome = pipeline.run(today(), &CancellationToken::new()).await.unwrap();

        assert_eq!(fx.storage.downloads.get(), 2);
        assert_eq!(outcome.prediction.label, "Deforestation");
        assert!(clock.sleeps().contains(&Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_no_imagery_submits_nothing() {
        let fx = fixture();
        let catalog = CloudCatalog(vec![45.0, 80.0]);
        let exporter = PollingExport::new(0, JobState::Completed);
        let clock = ManualClock::new();
        let pipeline = Pipeline {
            selection: &fx.selection,
            catalog: &catalog,
            exporter: &exporter,
            storage: &fx.storage,
            classifier: &fx.classifier,
            clock: &clock,
            settings: fx.settings.clone(),
        };

        let err = pipeline
            .run(today(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoImagery { .. }));
        assert_eq!(exporter.submits.get(), 0);
        assert_eq!(fx.storage.downloads.get(), 0);
    }

    #[tokio::test]
    async fn test_failed_export_skips_download() {
        let fx = fixture();
        let catalog = CloudCatalog(vec![10.0]);
        let exporter = PollingExport::new(1, JobState::Failed);
        let clock = ManualClock::new();
        let pipeline = Pipeline {
            selection: &fx.selection,
            catalog: &catalog,
            exporter: &exporter,
            storage: &fx.storage,
            classifier: &fx.classifier,
            clock: &clock,
            settings: fx.settings.clone(),
        };

        let err = pipeline
            .run(today(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExportFailed { .. }));
        assert_eq!(fx.storage.downloads.get(), 0);
    }

    #[tokio::test]
    async fn test_missing_selection_stops_before_catalog() {
        let fx = fixture();
        std::fs::remove_file(fx.selection.path()).unwrap();
        let catalog = CloudCatalog(vec![10.0]);
        let exporter = PollingExport::new(0, JobState::Completed);
        let clock = ManualClock::new();
        let pipeline = Pipeline {
            selection: &fx.selection,
            catalog: &catalog,
            exporter: &exporter,
            storage: &fx.storage,
            classifier: &fx.classifier,
            clock: &clock,
            settings: fx.settings.clone(),
        };

        let err = pipeline
            .run(today(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SelectionNotFound { .. }));
        assert_eq!(exporter.submits.get(), 0);
    }
}
