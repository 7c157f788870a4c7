// Storage module - the metadata connector used by the ingestion pipeline
//
// The ingestion layer only talks to `BgMetadataStorageConnector`. Which
// implementation sits behind it is decided once, from the configuration:
// the Elasticsearch connector, or a no-op one when indexing is disabled.

use async_trait::async_trait;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub mod buffer;
pub mod bulk;
pub mod client;
pub mod document;
pub mod elasticsearch;
pub mod grouping;
pub mod indices;
pub mod metric;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::IndexerSettings;
use bulk::FlushError;
use client::{HttpElasticSearchClient, TransportError};
use elasticsearch::ElasticSearchConnector;
use metric::{Metric, MetricDirectory};
use telemetry::ConnectorMetrics;

/// Errors returned to callers of the connector
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("connector closed")]
    Closed,

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error("Could not create ElasticSearch client: {0}")]
    Client(#[from] TransportError),

    #[error("Could not register connector metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Contract between the ingestion pipeline and the metadata index
///
/// Accepting a document does not mean it was written: writes happen in
/// bulk, and their outcome is only visible through logs and counters.
#[async_trait]
pub trait BgMetadataStorageConnector: Send + Sync {
    /// Queues a metric for indexing
    async fn update_metric_metadata(&self, metric: Metric) -> Result<(), StorageError>;

    /// Queues a directory for indexing; re-inserting a known one is harmless
    async fn insert_directory(&self, directory: MetricDirectory) -> Result<(), StorageError>;

    /// Looks a directory up, returning its parent path when it exists
    async fn select_directory(&self, path: &str) -> Result<String, StorageError>;

    /// Writes everything accepted so far and rejects further updates
    async fn close(&self);
}

/// Connector used when metadata indexing is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpConnector;

#[async_trait]
impl BgMetadataStorageConnector for NoOpConnector {
    async fn update_metric_metadata(&self, _metric: Metric) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_directory(&self, _directory: MetricDirectory) -> Result<(), StorageError> {
        Ok(())
    }

    async fn select_directory(&self, _path: &str) -> Result<String, StorageError> {
        Ok(String::new())
    }

    async fn close(&self) {}
}

/// The configured connector
pub enum StorageConnector {
    ElasticSearch(ElasticSearchConnector),
    NoOp(NoOpConnector),
}

#[async_trait]
impl BgMetadataStorageConnector for StorageConnector {
    async fn update_metric_metadata(&self, metric: Metric) -> Result<(), StorageError> {
        match self {
            StorageConnector::ElasticSearch(es) => es.update_metric_metadata(metric).await,
            StorageConnector::NoOp(noop) => noop.update_metric_metadata(metric).await,
        }
    }

    async fn insert_directory(&self, directory: MetricDirectory) -> Result<(), StorageError> {
        match self {
            StorageConnector::ElasticSearch(es) => es.insert_directory(directory).await,
            StorageConnector::NoOp(noop) => noop.insert_directory(directory).await,
        }
    }

    async fn select_directory(&self, path: &str) -> Result<String, StorageError> {
        match self {
            StorageConnector::ElasticSearch(es) => es.select_directory(path).await,
            StorageConnector::NoOp(noop) => noop.select_directory(path).await,
        }
    }

    async fn close(&self) {
        match self {
            StorageConnector::ElasticSearch(es) => es.close().await,
            StorageConnector::NoOp(noop) => noop.close().await,
        }
    }
}

/// Creates the connector selected by `settings`
///
/// Counters are registered on `registry`. Must be called from within a
/// Tokio runtime when batching is `grouped`, since the flush worker is
/// spawned immediately.
pub fn create_connector(
    settings: &IndexerSettings,
    registry: &Registry,
) -> Result<StorageConnector, StorageError> {
    if !settings.enabled {
        info!("Metadata indexing disabled, using no-op connector");
        return Ok(StorageConnector::NoOp(NoOpConnector));
    }

    let client = HttpElasticSearchClient::new(
        settings.storage_servers.clone(),
        settings.username.clone(),
        settings.password.clone(),
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    let metrics = ConnectorMetrics::new(registry)?;

    Ok(StorageConnector::ElasticSearch(ElasticSearchConnector::new(
        Arc::new(client),
        metrics,
        settings,
    )))
}
