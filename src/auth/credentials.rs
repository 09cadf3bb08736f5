//! Cached OAuth credentials.

use crate::constants::oauth::EXPIRY_SKEW_SECS;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Access and refresh tokens for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Long-lived token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credentials {
    /// Whether the access token is expired (or about to expire) at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    /// Whether the access token is expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// JSON file holding one service's credentials between runs.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the credentials file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cached credentials, or `None` if nothing is cached yet.
    pub fn load(&self) -> Result<Option<Credentials>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cached credentials at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::CredentialsRead {
                    path: self.path.clone(),
                    source: Box::new(e),
                });
            }
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| Error::CredentialsRead {
                path: self.path.clone(),
                source: Box::new(e),
            })
    }

    /// Persist credentials, replacing the previous file.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let write_err = |e: Box<dyn std::error::Error + Send + Sync>| Error::CredentialsWrite {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| write_err(Box::new(e)))?;
        }

        let json =
            serde_json::to_string_pretty(credentials).map_err(|e| write_err(Box::new(e)))?;
        std::fs::write(&self.path, json).map_err(|e| write_err(Box::new(e)))?;

        // Tokens grant account access; keep the file private to the user
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| write_err(Box::new(e)))?;
        }

        debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }
}
