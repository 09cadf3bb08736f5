//! CLI argument definitions.

use super::validators::{parse_latitude, parse_longitude, parse_percent, parse_radius};
use crate::config::{Config, MatchPolicy};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Forest cover classification for a selected area from recent satellite imagery.
#[derive(Debug, Parser)]
#[command(name = "forestwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for a pipeline run.
    #[command(flatten)]
    pub run: RunArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save the area to analyze.
    Select {
        /// Center latitude (-90.0 to 90.0).
        #[arg(long, value_parser = parse_latitude, allow_negative_numbers = true)]
        lat: f64,
        /// Center longitude (-180.0 to 180.0).
        #[arg(long, value_parser = parse_longitude, allow_negative_numbers = true)]
        lon: f64,
        /// Radius in meters.
        #[arg(long, value_parser = parse_radius)]
        radius: f64,
        /// Selection file to write (overrides config).
        #[arg(long)]
        selection: Option<PathBuf>,
    },
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Authorize both remote services ahead of a run.
    Auth,
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Arguments for a pipeline run.
#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Configuration file (default: platform config directory).
    #[arg(long, global = true, env = "FORESTWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Selection file to read (overrides config).
    #[arg(long, env = "FORESTWATCH_SELECTION")]
    pub selection: Option<PathBuf>,

    /// Working directory for the raster and preview.
    #[arg(long, env = "FORESTWATCH_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Path to ONNX model file (overrides config).
    #[arg(long, env = "FORESTWATCH_MODEL")]
    pub model: Option<PathBuf>,

    /// Path to labels file (overrides config).
    #[arg(long, env = "FORESTWATCH_LABELS")]
    pub labels: Option<PathBuf>,

    /// Model output holding class probabilities.
    #[arg(long, env = "FORESTWATCH_OUTPUT_KEY")]
    pub output_key: Option<String>,

    /// Cloud project for imagery API calls.
    #[arg(long, env = "FORESTWATCH_PROJECT")]
    pub project: Option<String>,

    /// Maximum cloud cover in percent (exclusive).
    #[arg(long, value_parser = parse_percent, env = "FORESTWATCH_CLOUD_THRESHOLD")]
    pub cloud_threshold: Option<f64>,

    /// Export deadline in seconds (0 waits indefinitely).
    #[arg(long, env = "FORESTWATCH_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Seconds between export status checks.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), env = "FORESTWATCH_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// What to do when several remote files match the export name.
    #[arg(long, value_enum, env = "FORESTWATCH_ON_MULTIPLE_MATCHES")]
    pub on_multiple_matches: Option<MatchPolicy>,

    /// Skip writing the preview image.
    #[arg(long)]
    pub no_preview: bool,

    /// Print the result as a JSON envelope.
    #[arg(long)]
    pub json: bool,

    /// Disable progress spinners and bars.
    #[arg(long)]
    pub no_progress: bool,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: trace+ORT debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl RunArgs {
    /// Apply command line overrides on top of file configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(path) = &self.selection {
            config.selection.path.clone_from(path);
        }
        if let Some(dir) = &self.work_dir {
            config.output.work_dir.clone_from(dir);
        }
        if let Some(model) = &self.model {
            config.model.path.clone_from(model);
        }
        if let Some(labels) = &self.labels {
            config.model.labels.clone_from(labels);
        }
        if let Some(key) = &self.output_key {
            config.model.output_key.clone_from(key);
        }
        if let Some(project) = &self.project {
            config.earth_engine.project = Some(project.clone());
        }
        if let Some(threshold) = self.cloud_threshold {
            config.earth_engine.cloud_threshold = threshold;
        }
        if let Some(timeout) = self.timeout {
            config.export.timeout_secs = timeout;
        }
        if let Some(interval) = self.poll_interval {
            config.export.poll_interval_secs = interval;
        }
        if let Some(policy) = self.on_multiple_matches {
            config.storage.on_multiple_matches = policy;
        }
        if self.no_preview {
            config.output.save_preview = false;
        }
    }

    /// Whether spinners and progress bars should be drawn.
    pub const fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress && !self.json
    }
}
