//! Persisted area selection (`selected_area.json`).

use super::Region;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk selection format.
///
/// ```json
/// {"center": {"lat": -14.235, "lon": -51.9253}, "radius": 500.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSelection {
    /// Circle center.
    pub center: StoredCenter,
    /// Radius in meters.
    pub radius: f64,
}

/// Circle center in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCenter {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

impl From<&Region> for StoredSelection {
    fn from(region: &Region) -> Self {
        Self {
            center: StoredCenter {
                lat: region.latitude,
                lon: region.longitude,
            },
            radius: region.radius_m,
        }
    }
}

/// Reads and writes the selection produced by the area picker.
#[derive(Debug, Clone)]
pub struct SelectionFile {
    path: PathBuf,
    max_radius_m: f64,
}

impl SelectionFile {
    /// Create a selection source for `path` with the given radius limit.
    pub fn new(path: impl Into<PathBuf>, max_radius_m: f64) -> Self {
        Self {
            path: path.into(),
            max_radius_m,
        }
    }

    /// Path of the selection file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved selection as a region.
    ///
    /// A missing file, invalid JSON, a different schema or an out-of-range
    /// region are all precondition failures.
    pub fn load(&self) -> Result<Region> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SelectionNotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let stored: StoredSelection =
            serde_json::from_str(&contents).map_err(|e| Error::SelectionInvalid {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        debug!("Loaded selection: {:?}", stored);

        Region::new(
            stored.center.lat,
            stored.center.lon,
            stored.radius,
            self.max_radius_m,
        )
        .map_err(|e| Error::SelectionInvalid {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Save a region, replacing any previous selection.
    pub fn save(&self, region: &Region) -> Result<()> {
        // Re-validate so a hand-built region cannot bypass the radius limit
        let region = Region::new(
            region.latitude,
            region.longitude,
            region.radius_m,
            self.max_radius_m,
        )?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(&StoredSelection::from(&region)).map_err(|e| {
            Error::Internal {
                message: format!("failed to serialize selection: {e}"),
            }
        })?;
        std::fs::write(&self.path, json)?;

        info!("Saved selection ({}) to {}", region, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> SelectionFile {
        SelectionFile::new(dir.path().join("selected_area.json"), 1000.0)
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let selection = source(&dir);

        for (lat, lon, radius) in [
            (-14.235, -51.9253, 500.0),
            (60.1699, 24.9384, 1000.0),
            (0.0, 0.0, 0.5),
        ] {
            let region = Region::new(lat, lon, radius, 1000.0).unwrap();
            selection.save(&region).unwrap();
            let loaded = selection.load().unwrap();

            assert!((loaded.latitude - lat).abs() < 1e-12);
            assert!((loaded.longitude - lon).abs() < 1e-12);
            assert!((loaded.radius_m - radius).abs() < 1e-12);
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            source(&dir).load(),
            Err(Error::SelectionNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_json_is_invalid_selection() {
        let dir = TempDir::new().unwrap();
        let selection = source(&dir);
        std::fs::write(selection.path(), "{not json").unwrap();

        assert!(matches!(
            selection.load(),
            Err(Error::SelectionInvalid { .. })
        ));
    }

    #[test]
    fn test_wrong_schema_is_invalid_selection() {
        let dir = TempDir::new().unwrap();
        let selection = source(&dir);
        std::fs::write(
            selection.path(),
            r#"{"center": [-51.9253, -14.235], "radius": 500}"#,
        )
        .unwrap();

        assert!(matches!(
            selection.load(),
            Err(Error::SelectionInvalid { .. })
        ));
    }

    #[test]
    fn test_oversized_radius_on_disk_is_invalid_selection() {
        let dir = TempDir::new().unwrap();
        let selection = source(&dir);
        std::fs::write(
            selection.path(),
            r#"{"center": {"lat": -14.235, "lon": -51.9253}, "radius": 5000}"#,
        )
        .unwrap();

        assert!(matches!(
            selection.load(),
            Err(Error::SelectionInvalid { .. })
        ));
    }

    #[test]
    fn test_save_rejects_oversized_radius() {
        let dir = TempDir::new().unwrap();
        let selection = source(&dir);
        let region = Region {
            latitude: 0.0,
            longitude: 0.0,
            radius_m: 2000.0,
        };

        assert!(matches!(
            selection.save(&region),
            Err(Error::InvalidRadius { .. })
        ));
        assert!(!selection.path().exists());
    }

    #[test]
    fn test_saved_file_matches_expected_shape() {
        let dir = TempDir::new().unwrap();
        let selection = source(&dir);
        selection
            .save(&Region::new(-14.235, -51.9253, 500.0, 1000.0).unwrap())
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(selection.path()).unwrap()).unwrap();
        assert_eq!(value["center"]["lat"], -14.235);
        assert_eq!(value["center"]["lon"], -51.9253);
        assert_eq!(value["radius"], 500.0);
    }
}
