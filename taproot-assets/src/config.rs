//! TOML configuration for the courier, the proof archive and the universe.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::retry::{
    RetryConfig, DEFAULT_INITIAL_RETRY_DELAY, DEFAULT_MAX_RETRY_DELAY, DEFAULT_NUM_RETRIES,
    DEFAULT_STORE_TIMEOUT,
};
use crate::archive::{ArchiveError, FileArchive, MemoryArchive, ProofArchive};
use crate::courier::backoff::BackoffConfig;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub courier: CourierConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading config from {}", path.display());
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

fn default_receive_timeout_ms() -> u64 {
    5_000
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_num_tries() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Bound on a single remote proof fetch.
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Delivery attempts before giving up.
    #[serde(default = "default_num_tries")]
    pub num_tries: u32,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: default_receive_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            num_tries: default_num_tries(),
        }
    }
}

impl CourierConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            num_tries: self.num_tries,
        }
    }
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT.as_millis() as u64
}

fn default_num_retries() -> u32 {
    DEFAULT_NUM_RETRIES
}

fn default_initial_retry_delay_ms() -> u64 {
    DEFAULT_INITIAL_RETRY_DELAY.as_millis() as u64
}

fn default_max_retry_delay_ms() -> u64 {
    DEFAULT_MAX_RETRY_DELAY.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory of the file archive. Proofs are kept in memory if unset.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            store_timeout_ms: default_store_timeout_ms(),
            num_retries: default_num_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl ArchiveConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            num_retries: self.num_retries,
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
            timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    /// A file archive under `root_dir`, or a memory archive if unset.
    pub fn open(&self) -> Result<Arc<dyn ProofArchive>, ArchiveError> {
        match &self.root_dir {
            Some(root_dir) => Ok(Arc::new(FileArchive::open(root_dir, self.retry())?)),
            None => Ok(Arc::new(MemoryArchive::new())),
        }
    }
}

fn default_page_size() -> usize {
    512
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Largest page served by the local universe.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Page size requested from remote universes during sync.
    #[serde(default = "default_page_size")]
    pub sync_page_size: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            sync_page_size: default_page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.courier.receive_timeout(), Duration::from_secs(5));
        assert_eq!(config.archive.retry(), RetryConfig::default());
        assert_eq!(config.universe.sync_page_size, 512);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [courier]
            num_tries = 3

            [archive]
            root_dir = "/var/lib/proofs"
            max_retry_delay_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.courier.num_tries, 3);
        assert_eq!(config.courier.max_backoff_ms, 60_000);
        assert_eq!(
            config.archive.root_dir.as_deref(),
            Some(Path::new("/var/lib/proofs"))
        );
        assert_eq!(config.archive.retry().max_delay, Duration::from_millis(500));
        assert_eq!(config.archive.num_retries, 10);
    }

    #[test]
    fn rejects_wrong_types() {
        let err = Config::from_toml_str("[universe]\npage_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
