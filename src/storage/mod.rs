//! Locating and downloading exported rasters from remote storage.

pub mod drive;

use crate::config::MatchPolicy;
use crate::constants::storage::RASTER_MIME;
use crate::error::{Error, Result};
use crate::export::ArtifactLocator;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use drive::DriveClient;

/// File entry in remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Service-assigned identifier.
    pub id: String,
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes, when the service reports it.
    pub size: Option<u64>,
}

/// Remote storage capability.
#[allow(async_fn_in_trait)]
pub trait StorageService {
    /// Establish or renew the storage session.
    async fn connect(&self) -> Result<()>;

    /// Files whose name contains `name_pattern` with the given MIME type,
    /// in the service's listing order.
    async fn find(&self, name_pattern: &str, mime_type: &str) -> Result<Vec<RemoteFile>>;

    /// Write the contents of `file` to `destination`, replacing it.
    async fn download(&self, file: &RemoteFile, destination: &Path) -> Result<()>;
}

/// Raster downloaded for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRaster {
    /// Local file path.
    pub path: PathBuf,
    /// Remote file name.
    pub remote_name: String,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Downloads the file produced by a completed export.
#[derive(Debug)]
pub struct ArtifactFetcher<'a, S> {
    storage: &'a S,
    policy: MatchPolicy,
}

impl<'a, S: StorageService> ArtifactFetcher<'a, S> {
    /// Fetcher using `storage`, resolving multiple matches with `policy`.
    pub const fn new(storage: &'a S, policy: MatchPolicy) -> Self {
        Self { storage, policy }
    }

    /// Download the raster for `locator` to `destination`.
    pub async fn fetch(&self, locator: &ArtifactLocator, destination: &Path) -> Result<LocalRaster> {
        self.storage.connect().await?;

        let matches = self.storage.find(&locator.name, RASTER_MIME).await?;
        let file = self.choose(&locator.name, matches)?;
        info!("Downloading '{}' to {}", file.name, destination.display());

        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.storage.download(&file, destination).await?;

        let size = tokio::fs::metadata(destination).await?.len();
        if let Some(expected) = file.size
            && expected != size
        {
            return Err(Error::DownloadIncomplete {
                path: destination.to_path_buf(),
                expected,
                actual: size,
            });
        }

        Ok(LocalRaster {
            path: destination.to_path_buf(),
            remote_name: file.name,
            size,
        })
    }

    fn choose(&self, pattern: &str, mut matches: Vec<RemoteFile>) -> Result<RemoteFile> {
        match matches.len() {
            0 => Err(Error::ArtifactNotFound {
                pattern: pattern.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            count => match self.policy {
                MatchPolicy::First => {
                    warn!(
                        "{count} files match '{pattern}'; using the first listed ('{}')",
                        matches[0].name
                    );
                    Ok(matches.remove(0))
                }
                MatchPolicy::Fail => Err(Error::AmbiguousArtifact {
                    pattern: pattern.to_string(),
                    count,
                }),
            },
        }
    }
}
