//! Progress indicators for long-running pipeline stages.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner shown while an export job is running.
pub fn create_export_spinner(job_name: &str, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] export {job_name}: {{msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Create a byte progress bar for a download of `total_bytes` (0 if unknown).
pub fn create_download_progress(
    total_bytes: u64,
    file_name: &str,
    enabled: bool,
) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new(total_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb.set_message(format!("Downloading {file_name}..."));
    Some(pb)
}

/// Update the message of a progress indicator.
pub fn set_progress_message(pb: Option<&ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.set_message(message.to_string());
    }
}

/// Advance a byte progress bar to `position`.
pub fn set_progress_position(pb: Option<&ProgressBar>, position: u64) {
    if let Some(pb) = pb {
        pb.set_position(position);
    }
}

/// Finish a progress bar with a message.
pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

/// Remove a progress bar from the terminal without a final message.
pub fn abandon_progress(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_progress_is_none() {
        assert!(create_export_spinner("current_image", false).is_none());
        assert!(create_download_progress(100, "current_image.tif", false).is_none());
    }

    #[test]
    fn test_helpers_accept_missing_bar() {
        set_progress_message(None, "RUNNING");
        set_progress_position(None, 10);
        finish_progress(None, "done");
        abandon_progress(None);
    }

    #[test]
    fn test_download_progress_tracks_position() {
        let pb = create_download_progress(100, "current_image.tif", true);
        set_progress_position(pb.as_ref(), 40);
        assert_eq!(pb.as_ref().map(ProgressBar::position), Some(40));
        finish_progress(pb, "Download complete");
    }
}
