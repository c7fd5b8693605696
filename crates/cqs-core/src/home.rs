//! Canonical state directory resolution for clinic-queue-sync
//!
//! Single source of truth for locating the per-user state directory shared
//! by every concurrently running client instance. Supports custom
//! deployments and testing via the `CQS_HOME` environment variable.
//!
//! # Precedence
//!
//! 1. `CQS_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Directory under the user home that holds all shared state.
pub const STATE_DIR_NAME: &str = ".clinic-sync";

/// Get the home directory for clinic-queue-sync state.
///
/// # Errors
///
/// Returns an error if `CQS_HOME` is not set and the platform home
/// directory cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    // Check CQS_HOME first (useful for testing and custom deployments)
    if let Ok(home) = std::env::var("CQS_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}

/// The shared state directory: `{home}/.clinic-sync`.
///
/// # Errors
///
/// Propagates failures from [`get_home_dir`].
pub fn state_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join(STATE_DIR_NAME))
}
