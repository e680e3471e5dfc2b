//! Atomic JSON file writes with advisory locking
//!
//! Writers serialize into a temp file in the target directory, fsync it, and rename it over the
//! target. Readers and writers coordinate through an fd-lock on a per-directory lock file.

use super::StoreError;
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the lock file created next to every persisted file
pub const LOCK_FILE_NAME: &str = ".harvest.lock";

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn open_lock_file(dir: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE_NAME))
        .map_err(|e| StoreError::LockError(format!("Failed to open lock file: {e}")))
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Either the previous complete file or the new complete file is visible afterwards, never a
/// partial one.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| {
        StoreError::IoError(format!("Failed to create directory {}: {e}", dir.display()))
    })?;

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    let mut lock = RwLock::new(open_lock_file(dir)?);
    let _guard = lock
        .write()
        .map_err(|e| StoreError::LockError(format!("Failed to acquire write lock: {e}")))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| StoreError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| StoreError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| StoreError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| StoreError::IoError(format!("Failed to persist {}: {e}", path.display())))?;

    // Rename durability
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    debug!(path = %path.display(), bytes = json.len(), "Persisted JSON file");
    Ok(())
}

/// Read a JSON file written by [`write_json`]. Returns `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let dir = parent_dir(path);
    let lock = RwLock::new(open_lock_file(dir)?);
    let _guard = lock
        .read()
        .map_err(|e| StoreError::LockError(format!("Failed to acquire read lock: {e}")))?;

    let contents = std::fs::read_to_string(path)
        .map_err(|e| StoreError::IoError(format!("Failed to read {}: {e}", path.display())))?;

    serde_json::from_str(&contents).map(Some).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to deserialize persisted file");
        StoreError::DeserializationError {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}
