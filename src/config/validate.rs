//! Configuration validation.

use crate::config::{Config, ModelConfig};
use crate::constants::tensor;
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_imagery(config)?;
    validate_export(config)?;
    validate_retry(config)?;

    let max_radius = config.selection.max_radius_m;
    if max_radius.is_nan() || max_radius <= 0.0 {
        return Err(Error::ConfigValidation {
            message: format!(
                "selection.max_radius_m must be positive, got {max_radius}"
            ),
        });
    }

    Ok(())
}

/// Validate imagery platform settings.
fn validate_imagery(config: &Config) -> Result<()> {
    let ee = &config.earth_engine;

    if !(0.0..=100.0).contains(&ee.cloud_threshold) {
        return Err(Error::ConfigValidation {
            message: format!(
                "cloud_threshold must be between 0 and 100, got {}",
                ee.cloud_threshold
            ),
        });
    }

    if ee.window_days < 0 {
        return Err(Error::ConfigValidation {
            message: format!("window_days must be non-negative, got {}", ee.window_days),
        });
    }

    // Band order maps 1:1 onto tensor channels
    if ee.bands.len() != tensor::CHANNELS {
        return Err(Error::ConfigValidation {
            message: format!(
                "exactly {} bands are required, got {}",
                tensor::CHANNELS,
                ee.bands.len()
            ),
        });
    }

    Ok(())
}

/// Validate export job settings.
fn validate_export(config: &Config) -> Result<()> {
    let export = &config.export;

    if export.scale_m.is_nan() || export.scale_m <= 0.0 {
        return Err(Error::ConfigValidation {
            message: format!("export scale must be positive, got {}", export.scale_m),
        });
    }

    if export.poll_interval_secs == 0 {
        return Err(Error::ConfigValidation {
            message: "poll_interval_secs must be at least 1".to_string(),
        });
    }

    if export.name.trim().is_empty() {
        return Err(Error::ConfigValidation {
            message: "export name must not be empty".to_string(),
        });
    }

    Ok(())
}

/// Validate network retry settings.
fn validate_retry(config: &Config) -> Result<()> {
    let retry = &config.retry;

    if retry.max_attempts == 0 {
        return Err(Error::ConfigValidation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if retry.initial_delay_ms > retry.max_delay_ms {
        return Err(Error::ConfigValidation {
            message: format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                retry.initial_delay_ms, retry.max_delay_ms
            ),
        });
    }

    Ok(())
}

/// Validate a model configuration and check files exist.
pub fn validate_model_config(model: &ModelConfig) -> Result<()> {
    if !model.path.exists() {
        return Err(Error::ModelFileNotFound {
            path: model.path.clone(),
        });
    }

    if !model.labels.exists() {
        return Err(Error::LabelsFileNotFound {
            path: model.labels.clone(),
        });
    }

    if model.output_key.is_empty() {
        return Err(Error::ConfigValidation {
            message: "model.output_key must not be empty".to_string(),
        });
    }

    Ok(())
}
