use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::types::WorkerId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Database configuration. Every field has a default so a partial TOML file
/// (or none at all) is enough to bring a database up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Directory holding WAL files (and, next to them, snapshots).
    pub durability_directory: PathBuf,
    /// Whether state deltas are written to the WAL at all.
    pub durability_enabled: bool,
    /// Flush the WAL before acknowledging a commit.
    pub synchronous_commit: bool,
    pub wal_flush_interval_ms: u64,
    /// Rotate the current WAL file after this many deltas.
    pub wal_rotate_deltas_count: usize,
    pub query_execution_timeout_sec: u64,
    pub lock_timeout_ms: u64,
    /// Period of the version garbage-collection cycle.
    pub gc_cycle_sec: u64,
    pub worker_id: WorkerId,
    /// Endpoint of the cluster master; `None` runs single-worker.
    pub master_endpoint: Option<String>,
    /// Endpoint this worker's RPC server binds to; `None` runs single-worker.
    pub listen_endpoint: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            durability_directory: PathBuf::from("durability"),
            durability_enabled: true,
            synchronous_commit: true,
            wal_flush_interval_ms: 100,
            wal_rotate_deltas_count: 100_000,
            query_execution_timeout_sec: 180,
            lock_timeout_ms: 2_000,
            gc_cycle_sec: 30,
            worker_id: 0,
            master_endpoint: None,
            listen_endpoint: None,
        }
    }
}

impl DatabaseConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn wal_flush_interval(&self) -> Duration {
        Duration::from_millis(self.wal_flush_interval_ms)
    }

    pub fn query_execution_timeout(&self) -> Duration {
        Duration::from_secs(self.query_execution_timeout_sec)
    }

    pub fn gc_cycle(&self) -> Duration {
        Duration::from_secs(self.gc_cycle_sec)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DatabaseConfig::default();
        assert!(config.durability_enabled);
        assert!(config.synchronous_commit);
        assert_eq!(config.lock_timeout(), Duration::from_millis(2_000));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "durability_enabled = false\nlock_timeout_ms = 50\nworker_id = 3"
        )
        .unwrap();
        let config = DatabaseConfig::from_path(file.path()).unwrap();
        assert!(!config.durability_enabled);
        assert_eq!(config.lock_timeout_ms, 50);
        assert_eq!(config.worker_id, 3);
        assert!(config.synchronous_commit);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "no_such_option = 1").unwrap();
        assert!(DatabaseConfig::from_path(file.path()).is_err());
    }
}
