//! Atomic JSON reads and writes for shared state files

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as JSON and write it to `path` atomically.
///
/// The content is written to a sibling temp file, flushed (and `sync_data`'d
/// on unix), then renamed over the target. A reader in another process sees
/// either the old file or the new one, never a partial write. Parent
/// directories are created as needed.
///
/// # Errors
///
/// Returns [`StoreError::StorageUnavailable`] when the directory or file
/// cannot be created or written, [`StoreError::Io`] for rename failures, and
/// [`StoreError::Json`] if serialization fails.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::StorageUnavailable {
            path: parent.to_path_buf(),
            source: e,
        })?;
    } else {
        return Err(StoreError::InvalidPath {
            path: path.to_path_buf(),
        });
    }

    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;

    // Per-process temp name so two instances never race on the same temp file.
    let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
    {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| StoreError::StorageUnavailable {
                path: tmp_path.clone(),
                source: e,
            })?;
        file.write_all(&json).map_err(|e| StoreError::StorageUnavailable {
            path: tmp_path.clone(),
            source: e,
        })?;
        file.flush().map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        // sync_data() persists file data without requiring metadata sync,
        // which is sufficient for the content to survive a crash.
        #[cfg(unix)]
        file.sync_data().map_err(|e| StoreError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read and deserialize a JSON file.
///
/// # Errors
///
/// Returns [`StoreError::Io`] when the file cannot be read and
/// [`StoreError::Json`] when it does not parse.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = std::fs::read(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&content).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}
