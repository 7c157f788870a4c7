// Configuration module - connector settings
//
// This module is responsible for:
// 1. Loading the indexer settings from a JSON file
// 2. Filling every missing setting with its default
// 3. Validating the result before a connector is built

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::storage::indices::DEFAULT_INDEX_NAME;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// How producers hand documents to the bulk buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchingMode {
    /// Producers add to the buffer and perform the flush that fills it
    Direct,
    /// Producers enqueue; a dedicated worker groups documents and flushes
    Grouped,
}

/// Settings of the metadata indexer
///
/// # Example Settings File
/// ```json
/// {
///   "enabled": true,
///   "storage_servers": ["http://es1:9200", "http://es2:9200"],
///   "username": "relay",
///   "password": "secret",
///   "index_name": "biggraphite_metrics",
///   "bulk_size": 1000,
///   "max_retry": 3,
///   "retry_backoff_ms": 100,
///   "request_timeout_secs": 30,
///   "batching": "grouped"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// When false, a no-op connector is used and nothing is indexed
    pub enabled: bool,

    /// Base URLs of the Elasticsearch nodes, used round-robin
    pub storage_servers: Vec<String>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Base name of the daily indices
    pub index_name: String,

    /// Number of documents per bulk write
    pub bulk_size: usize,

    /// Retries after a rejected bulk write (total attempts = max_retry + 1)
    pub max_retry: u32,

    /// Pause between two bulk attempts
    pub retry_backoff_ms: u64,

    /// Connect and request timeout of the HTTP client
    pub request_timeout_secs: u64,

    pub batching: BatchingMode,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        IndexerSettings {
            enabled: true,
            storage_servers: vec!["http://localhost:9200".to_string()],
            username: None,
            password: None,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            bulk_size: 1000,
            max_retry: 3,
            retry_backoff_ms: 100,
            request_timeout_secs: 30,
            batching: BatchingMode::Grouped,
        }
    }
}

impl IndexerSettings {
    /// Loads and validates settings from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the settings file; missing keys take their default
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading indexer settings from {}", path.display());

        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let settings: IndexerSettings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks the settings a connector cannot work without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk_size == 0 {
            return Err(ConfigError::InvalidSetting(
                "bulk_size must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.index_name.is_empty() {
            return Err(ConfigError::InvalidSetting(
                "index_name must not be empty".to_string(),
            ));
        }
        if self.enabled && self.storage_servers.is_empty() {
            return Err(ConfigError::InvalidSetting(
                "storage_servers must list at least one address".to_string(),
            ));
        }
        Ok(())
    }
}
