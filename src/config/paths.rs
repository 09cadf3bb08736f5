//! Platform-specific configuration paths.

use crate::constants::APP_NAME;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/forestwatch/`
/// - macOS: `~/Library/Application Support/forestwatch/`
/// - Windows: `%APPDATA%\forestwatch\`
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve a credentials cache path.
///
/// An explicitly configured path wins; otherwise the file lives in the
/// configuration directory.
pub fn credentials_path(configured: Option<&Path>, default_name: &str) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config_dir()?.join(default_name)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_returns_path() {
        let result = config_dir();
        assert!(result.is_ok());
        let path = result.ok();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("forestwatch"));
    }

    #[test]
    fn test_config_file_path_ends_with_toml() {
        let result = config_file_path();
        assert!(result.is_ok());
        let path = result.ok().unwrap();
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_credentials_path_prefers_configured() {
        let path = credentials_path(Some(Path::new("/tmp/creds.json")), "default.json").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/creds.json"));

        let path = credentials_path(None, "default.json").unwrap();
        assert!(path.ends_with("default.json"));
    }
}
