//! forestwatch - forest cover classification from recent satellite imagery.
//!
//! A run loads the saved area selection, asks Earth Engine for a low-cloud
//! median composite around today, exports it to Google Drive, downloads the
//! GeoTIFF, turns it into a model tensor and classifies it with an ONNX model.

#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod earthengine;
pub mod error;
pub mod export;
pub mod geometry;
pub mod http;
pub mod imagery;
pub mod inference;
pub mod locking;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod storage;
pub mod utils;

use auth::{CredentialStore, GoogleOAuthFlow, OAuthClient, OAuthSession, Session};
use clap::Parser;
use cli::{Cli, Command, ConfigAction, RunArgs};
use config::{Config, config_file_path, credentials_path, load_config_file, save_config};
use constants::oauth::{
    DRIVE_CREDENTIALS, DRIVE_SCOPES, EARTH_ENGINE_CREDENTIALS, EARTH_ENGINE_SCOPES,
};
use earthengine::EarthEngineClient;
use geometry::{Region, SelectionFile};
use inference::{Classifier, OnnxInferenceService};
use locking::RunLock;
use output::{ErrorPayload, EventType, JsonEnvelope, ResultPayload};
use pipeline::{Pipeline, PipelineOutcome, PipelineSettings};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use storage::DriveClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utils::clock::SystemClock;

pub use error::{Error, Result};

type GoogleSession = OAuthSession<GoogleOAuthFlow>;

/// Main entry point for forestwatch CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.run.verbose, cli.run.quiet);

    // First Ctrl+C stops the run at the next wait; a second one exits immediately
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    let interrupted = AtomicBool::new(false);
    if let Err(e) = ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            locking::cleanup_all_locks();
            std::process::exit(130); // 128 + SIGINT(2)
        }
        handler_token.cancel();
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let config_path = match &cli.run.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };

    match cli.command {
        Some(Command::Config { action }) => handle_config_command(action, &config_path),
        Some(Command::Select {
            lat,
            lon,
            radius,
            selection,
        }) => {
            let config = load_config(&config_path, &cli.run)?;
            handle_select(lat, lon, radius, selection, &config)
        }
        Some(Command::Auth) => handle_auth(&load_config(&config_path, &cli.run)?),
        None => {
            let config = load_config(&config_path, &cli.run)?;
            run_pipeline(&cli.run, &config, &cancel)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging stays off unless explicitly asked for with -v.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(), // -vvv: no ORT filter, full trace
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file, apply command line overrides and validate the result.
fn load_config(path: &std::path::Path, args: &RunArgs) -> Result<Config> {
    let mut config = load_config_file(path)?;
    args.apply_to(&mut config);
    config::validate_config(&config)?;
    Ok(config)
}

#[allow(clippy::print_stdout)]
fn handle_select(
    lat: f64,
    lon: f64,
    radius: f64,
    path: Option<PathBuf>,
    config: &Config,
) -> Result<()> {
    let max = config.selection.max_radius_m;
    let region = Region::new(lat, lon, radius, max)?;
    let selection = SelectionFile::new(path.unwrap_or_else(|| config.selection.path.clone()), max);
    selection.save(&region)?;

    println!("Selected {region}");
    println!("Saved to {}", selection.path().display());
    Ok(())
}

#[allow(clippy::print_stdout)]
fn handle_auth(config: &Config) -> Result<()> {
    let http = http::build_client()?;
    let mut earth_engine = earth_engine_session(&http, config)?;
    let mut drive = drive_session(&http, config)?;

    block_on(async {
        earth_engine.acquire().await?;
        drive.acquire().await
    })?;

    println!("Earth Engine and Drive are authorized.");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn handle_config_command(action: ConfigAction, path: &std::path::Path) -> Result<()> {
    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                save_config(&Config::default(), path)?;
                println!("Created configuration file: {}", path.display());
                println!("\nNext steps:");
                println!("  Set earth_engine.project and the [auth] client in that file,");
                println!("  then run 'forestwatch auth'.");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config_file(path)?;
            let contents = toml::to_string_pretty(&config)
                .map_err(|e| Error::ConfigSerialize { source: e })?;
            println!("{contents}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal {
        message: format!("Failed to create async runtime: {e}"),
    })?;
    Ok(runtime.block_on(future))
}

fn oauth_client(config: &Config) -> Result<OAuthClient> {
    match (&config.auth.client_id, &config.auth.client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(OAuthClient {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        }),
        _ => Err(Error::ConfigValidation {
            message: "auth.client_id and auth.client_secret must be set".to_string(),
        }),
    }
}

fn earth_engine_session(http: &reqwest::Client, config: &Config) -> Result<GoogleSession> {
    let flow = GoogleOAuthFlow::new(
        http.clone(),
        oauth_client(config)?,
        EARTH_ENGINE_SCOPES,
        "Earth Engine",
    );
    let path = credentials_path(
        config.earth_engine.credentials.as_deref(),
        EARTH_ENGINE_CREDENTIALS,
    )?;
    Ok(OAuthSession::new("Earth Engine", flow, CredentialStore::new(path)))
}

fn drive_session(http: &reqwest::Client, config: &Config) -> Result<GoogleSession> {
    let flow = GoogleOAuthFlow::new(http.clone(), oauth_client(config)?, DRIVE_SCOPES, "Drive");
    let path = credentials_path(config.storage.credentials.as_deref(), DRIVE_CREDENTIALS)?;
    Ok(OAuthSession::new("Drive", flow, CredentialStore::new(path)))
}

/// Run the pipeline once and report the outcome.
fn run_pipeline(args: &RunArgs, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let outcome = execute(args, config, cancel);

    if args.json {
        print_json(&outcome);
    }

    let outcome = outcome?;
    if !args.json {
        print_prediction(&outcome);
    }
    Ok(())
}

fn execute(args: &RunArgs, config: &Config, cancel: &CancellationToken) -> Result<PipelineOutcome> {
    let selection = SelectionFile::new(&config.selection.path, config.selection.max_radius_m);
    // Fail before loading the model or prompting for authorization.
    selection.load()?;

    let Some(project) = config.earth_engine.project.clone() else {
        if !args.json {
            cli::help::print_first_time_help();
        }
        return Err(Error::ConfigValidation {
            message: "no Earth Engine project configured (use --project or set earth_engine.project)"
                .to_string(),
        });
    };

    config::validate_model_config(&config.model)?;
    let service = OnnxInferenceService::load(&config.model.path)?;
    let classifier =
        Classifier::with_labels_file(service, &config.model.labels, config.model.output_key.as_str())?;
    info!("Loaded {} labels", classifier.labels().len());

    let show_progress = args.progress_enabled();
    let http = http::build_client()?;
    let earth_engine = EarthEngineClient::new(
        http.clone(),
        project,
        earth_engine_session(&http, config)?,
    );
    let drive = DriveClient::new(http.clone(), drive_session(&http, config)?, show_progress);

    let _lock = RunLock::acquire(
        &config.output.work_dir,
        Duration::from_secs(config.output.stale_lock_secs),
    )?;

    let pipeline = Pipeline {
        selection: &selection,
        catalog: &earth_engine,
        exporter: &earth_engine,
        storage: &drive,
        classifier: &classifier,
        clock: &SystemClock,
        settings: PipelineSettings::from_config(config, show_progress),
    };

    let today = chrono::Local::now().date_naive();
    block_on(pipeline.run(today, cancel))?
}

#[allow(clippy::print_stdout)]
fn print_prediction(outcome: &PipelineOutcome) {
    println!("{}", outcome.prediction);
}

#[allow(clippy::print_stdout)]
fn print_json(outcome: &Result<PipelineOutcome>) {
    let line = match outcome {
        Ok(outcome) => JsonEnvelope::new(EventType::Result, result_payload(outcome)).to_json(),
        Err(Error::Cancelled) => {
            JsonEnvelope::new(EventType::Cancelled, ErrorPayload::from(&Error::Cancelled)).to_json()
        }
        Err(e) => JsonEnvelope::new(EventType::Error, ErrorPayload::from(e)).to_json(),
    };
    println!("{line}");
}

fn result_payload(outcome: &PipelineOutcome) -> ResultPayload {
    ResultPayload {
        label: outcome.prediction.label.clone(),
        confidence: outcome.prediction.confidence,
        index: outcome.prediction.index,
        latitude: outcome.region.latitude,
        longitude: outcome.region.longitude,
        radius_m: outcome.region.radius_m,
        window_start: outcome.window.start,
        window_end: outcome.window.end,
        source_images: outcome.source_images,
        raster: outcome.raster.path.clone(),
        preview: outcome.preview.clone(),
    }
}
