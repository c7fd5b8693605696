//! Configuration for the sync engine
//!
//! Loaded from `{home}/.clinic-sync/config.toml` when present, with
//! environment overrides (`CQS_POLL_INTERVAL_SECS`, `CQS_COALESCE_WINDOW_MS`)
//! applied on top. Every section has defaults so a missing or partial file
//! is never an error.

use crate::home::state_dir;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sync engine configuration
    #[serde(default)]
    pub sync: SyncConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Coalescing window for settled bus subscriptions, in milliseconds
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
    /// Polling safety-net interval for the refresh scheduler, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: default_coalesce_window_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Override for the shared state directory (default: ~/.clinic-sync)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_coalesce_window_ms() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from the state directory, then apply env overrides.
    ///
    /// A missing config file yields defaults. A malformed file is reported
    /// with a warning and replaced by defaults rather than failing startup.
    pub fn load() -> Self {
        let mut config = state_dir()
            .ok()
            .map(|dir| dir.join("config.toml"))
            .filter(|path| path.exists())
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!("Could not read {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        if let Some(v) = env_u64("CQS_COALESCE_WINDOW_MS") {
            config.sync.coalesce_window_ms = v;
        }
        if let Some(v) = env_u64("CQS_POLL_INTERVAL_SECS") {
            config.sync.poll_interval_secs = v;
        }
        config
    }

    /// Coalescing window as a [`Duration`].
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.sync.coalesce_window_ms)
    }

    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    /// Path of the shared session file, honoring the storage dir override.
    pub fn session_path(&self) -> Result<PathBuf> {
        let dir = match &self.storage.dir {
            Some(dir) => PathBuf::from(dir),
            None => state_dir()?,
        };
        Ok(dir.join("session.json"))
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.coalesce_window_ms, 300);
        assert_eq!(config.sync.poll_interval_secs, 60);
        assert_eq!(config.storage.dir, None);
    }

    #[test]
    fn test_config_partial_toml() {
        let toml_str = r#"
[sync]
poll_interval_secs = 15
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sync.poll_interval_secs, 15);
        // Untouched field keeps its default
        assert_eq!(config.sync.coalesce_window_ms, 300);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.sync.coalesce_window_ms,
            deserialized.sync.coalesce_window_ms
        );
        assert_eq!(
            config.sync.poll_interval_secs,
            deserialized.sync.poll_interval_secs
        );
    }

    #[test]
    #[serial]
    fn test_load_reads_file_and_env_overrides() {
        let tmp = TempDir::new().unwrap();
        let state = tmp.path().join(".clinic-sync");
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(
            state.join("config.toml"),
            "[sync]\ncoalesce_window_ms = 500\npoll_interval_secs = 30\n",
        )
        .unwrap();

        unsafe {
            std::env::set_var("CQS_HOME", tmp.path());
            std::env::set_var("CQS_POLL_INTERVAL_SECS", "5");
            std::env::remove_var("CQS_COALESCE_WINDOW_MS");
        }

        let config = Config::load();
        assert_eq!(config.sync.coalesce_window_ms, 500);
        // Env wins over file
        assert_eq!(config.sync.poll_interval_secs, 5);

        unsafe {
            std::env::remove_var("CQS_HOME");
            std::env::remove_var("CQS_POLL_INTERVAL_SECS");
        }
    }

    #[test]
    #[serial]
    fn test_load_malformed_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let state = tmp.path().join(".clinic-sync");
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(state.join("config.toml"), "not valid toml [").unwrap();

        unsafe {
            std::env::set_var("CQS_HOME", tmp.path());
            std::env::remove_var("CQS_POLL_INTERVAL_SECS");
            std::env::remove_var("CQS_COALESCE_WINDOW_MS");
        }

        let config = Config::load();
        assert_eq!(config.sync.coalesce_window_ms, 300);
        assert_eq!(config.sync.poll_interval_secs, 60);

        unsafe {
            std::env::remove_var("CQS_HOME");
        }
    }

    #[test]
    fn test_session_path_honors_storage_override() {
        let config = Config {
            storage: StorageConfig {
                dir: Some("/srv/clinic-state".to_string()),
            },
            ..Config::default()
        };
        assert_eq!(
            config.session_path().unwrap(),
            PathBuf::from("/srv/clinic-state/session.json")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.coalesce_window(), Duration::from_millis(300));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }
}
