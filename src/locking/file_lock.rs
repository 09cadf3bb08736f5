//! Single-run lock on the working directory.

use crate::constants::LOCK_FILE_NAME;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Lock file content for debugging.
#[derive(Debug, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that holds the lock.
    pub pid: u32,
    /// Hostname of the machine.
    pub hostname: String,
    /// When the lock was acquired.
    pub started: DateTime<Utc>,
    /// Working directory being used.
    pub work_dir: PathBuf,
}

/// RAII guard ensuring one pipeline run per working directory.
#[derive(Debug)]
pub struct RunLock {
    lock_path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for `work_dir`, creating the directory if needed.
    ///
    /// A leftover lock older than `stale_after` is removed first.
    pub fn acquire(work_dir: &Path, stale_after: Duration) -> Result<Self> {
        fs::create_dir_all(work_dir)?;
        let lock_path = Self::lock_path_for(work_dir);

        if Self::is_stale(&lock_path, stale_after) {
            warn!("Removing stale lock {}", lock_path.display());
            fs::remove_file(&lock_path).map_err(|e| Error::LockRemove {
                path: lock_path.clone(),
                source: e,
            })?;
        }

        // Try to create lock file exclusively
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path);

        match file {
            Ok(mut f) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    hostname: hostname::get().map_or_else(
                        |_| "unknown".to_string(),
                        |h| h.to_string_lossy().into_owned(),
                    ),
                    started: Utc::now(),
                    work_dir: work_dir.to_path_buf(),
                };

                let json = serde_json::to_string_pretty(&info).unwrap_or_else(|_| "{}".to_string());
                let _ = f.write_all(json.as_bytes());

                // Register for cleanup on signal
                register_lock(&lock_path);
                debug!("Acquired {}", lock_path.display());

                Ok(Self { lock_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::FileLocked { path: lock_path })
            }
            Err(e) => Err(Error::LockCreate {
                path: lock_path,
                source: e,
            }),
        }
    }

    /// Lock file path for a working directory.
    pub fn lock_path_for(work_dir: &Path) -> PathBuf {
        work_dir.join(LOCK_FILE_NAME)
    }

    /// Whether a lock file exists and is older than `max_age`.
    fn is_stale(lock_path: &Path, max_age: Duration) -> bool {
        if let Ok(metadata) = fs::metadata(lock_path)
            && let Ok(modified) = metadata.modified()
        {
            return modified.elapsed().unwrap_or_default() > max_age;
        }
        false
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
        unregister_lock(&self.lock_path);
    }
}

/// Global registry of active lock paths for cleanup on signal.
static ACTIVE_LOCKS: std::sync::LazyLock<std::sync::Mutex<Vec<PathBuf>>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(Vec::new()));

/// Register a lock path for cleanup on signal.
pub fn register_lock(path: &Path) {
    if let Ok(mut locks) = ACTIVE_LOCKS.lock() {
        locks.push(path.to_path_buf());
    }
}

/// Unregister a lock path after normal cleanup.
pub fn unregister_lock(path: &Path) {
    if let Ok(mut locks) = ACTIVE_LOCKS.lock() {
        locks.retain(|p| p != path);
    }
}

/// Clean up all registered locks. Called on signal.
pub fn cleanup_all_locks() {
    if let Ok(locks) = ACTIVE_LOCKS.lock() {
        for lock_path in locks.iter() {
            let _ = fs::remove_file(lock_path);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_acquire_and_release_lock() {
        let temp_dir = TempDir::new().unwrap();
        let work_dir = temp_dir.path().join("work");

        let lock = RunLock::acquire(&work_dir, HOUR).unwrap();
        let lock_path = RunLock::lock_path_for(&work_dir);
        assert!(lock_path.exists());

        let info: LockInfo =
            serde_json::from_str(&fs::read_to_string(&lock_path).unwrap()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.work_dir, work_dir);

        drop(lock);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_second_run_is_refused() {
        let temp_dir = TempDir::new().unwrap();

        let _lock = RunLock::acquire(temp_dir.path(), HOUR).unwrap();
        let second = RunLock::acquire(temp_dir.path(), HOUR);

        assert!(matches!(second, Err(Error::FileLocked { .. })));
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        File::create(RunLock::lock_path_for(temp_dir.path())).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let lock = RunLock::acquire(temp_dir.path(), Duration::from_millis(1));
        assert!(lock.is_ok());
    }

    #[test]
    fn test_lock_path_format() {
        let path = RunLock::lock_path_for(Path::new("/data/work"));
        assert_eq!(path.to_string_lossy(), "/data/work/.forestwatch.lock");
    }

    #[test]
    fn test_cleanup_all_locks_removes_registered_files() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("orphan.lock");

        // Create a lock file manually (simulating orphaned lock)
        File::create(&lock_path).unwrap();
        assert!(lock_path.exists());

        // Register and cleanup
        register_lock(&lock_path);
        cleanup_all_locks();

        // Lock file should be removed
        assert!(!lock_path.exists());
        unregister_lock(&lock_path);
    }
}
