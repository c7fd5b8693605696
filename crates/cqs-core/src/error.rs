//! Error types for shared-state storage operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing the shared state files.
///
/// Callers of [`crate::session::SessionStore`] never see these as failures:
/// write errors are absorbed into memory-only degradation. They surface only
/// through logs and through the lower-level [`crate::io`] functions.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The shared medium cannot be written (read-only mount, quota, perms)
    #[error("Shared state not writable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse JSON
    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Invalid state path (e.g., no parent directory)
    #[error("Invalid state path: {path}")]
    InvalidPath { path: PathBuf },
}
