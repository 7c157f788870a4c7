// Elasticsearch metadata connector
//
// Metrics and directories are buffered and written with the `_bulk` API.
// In `direct` mode the caller that fills the buffer performs the write; in
// `grouped` mode callers only enqueue, and a worker task owns every write.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::buffer::BulkBuffer;
use super::bulk::BulkExecutor;
use super::client::ElasticSearchClient;
use super::document::IndexDocument;
use super::grouping::GroupingChannel;
use super::indices::IndexManager;
use super::metric::{Metric, MetricDirectory};
use super::telemetry::ConnectorMetrics;
use super::{BgMetadataStorageConnector, StorageError};
use crate::config::{BatchingMode, IndexerSettings};

/// Lifecycle of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// No index has been resolved yet
    Uninitialized,
    /// Today's indices exist and are mapped
    Ready,
    /// `close` was called; updates are rejected
    Closed,
}

enum Ingress {
    Direct,
    Grouped {
        sender: RwLock<Option<mpsc::Sender<IndexDocument>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
    },
}

/// Connector writing metadata documents to Elasticsearch
pub struct ElasticSearchConnector {
    buffer: Arc<BulkBuffer>,
    ingress: Ingress,
    closing: AtomicBool,
}

impl ElasticSearchConnector {
    /// Creates a connector on top of `client`
    ///
    /// In `grouped` mode this spawns the grouping stage and the flush worker,
    /// so it must run inside a Tokio runtime.
    pub fn new(
        client: Arc<dyn ElasticSearchClient>,
        metrics: ConnectorMetrics,
        settings: &IndexerSettings,
    ) -> Self {
        let executor = BulkExecutor::new(
            client,
            metrics,
            settings.max_retry,
            Duration::from_millis(settings.retry_backoff_ms),
        );
        let indices = IndexManager::new(&settings.index_name);
        let buffer = Arc::new(BulkBuffer::new(executor, indices, settings.bulk_size));

        let ingress = match settings.batching {
            BatchingMode::Direct => Ingress::Direct,
            BatchingMode::Grouped => {
                let (sender, input) = mpsc::channel(buffer.capacity());
                let groups = GroupingChannel::new(buffer.capacity(), input);
                let worker = tokio::spawn(run_flush_worker(groups, Arc::clone(&buffer)));
                Ingress::Grouped {
                    sender: RwLock::new(Some(sender)),
                    worker: Mutex::new(Some(worker)),
                }
            }
        };

        info!(
            "ElasticSearch connector created (index: {}, bulk size: {}, max retry: {}, batching: {:?})",
            settings.index_name, settings.bulk_size, settings.max_retry, settings.batching
        );

        ElasticSearchConnector {
            buffer,
            ingress,
            closing: AtomicBool::new(false),
        }
    }

    /// Creates and maps today's indices now instead of on the first flush
    pub async fn initialize(&self) -> Result<(), StorageError> {
        self.buffer.resolve_indices().await?;
        Ok(())
    }

    pub async fn state(&self) -> ConnectorState {
        if self.closing.load(Ordering::SeqCst) {
            ConnectorState::Closed
        } else if self.buffer.known_indices().await > 0 {
            ConnectorState::Ready
        } else {
            ConnectorState::Uninitialized
        }
    }

    pub fn metrics(&self) -> &ConnectorMetrics {
        self.buffer.executor().metrics()
    }

    async fn submit(&self, document: IndexDocument) -> Result<(), StorageError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }

        match &self.ingress {
            Ingress::Direct => accept(self.buffer.add(document).await),
            Ingress::Grouped { sender, .. } => {
                let sender = match sender.read().await.as_ref() {
                    Some(sender) => sender.clone(),
                    None => return Err(StorageError::Closed),
                };
                sender
                    .send(document)
                    .await
                    .map_err(|_| StorageError::Closed)
            }
        }
    }
}

/// Turns a flush failure into a log line: callers only learn whether their
/// document was accepted
fn accept(result: Result<(), StorageError>) -> Result<(), StorageError> {
    match result {
        Err(StorageError::Flush(e)) => {
            error!("Bulk flush failed: {}", e);
            Ok(())
        }
        other => other,
    }
}

async fn run_flush_worker(mut groups: GroupingChannel<IndexDocument>, buffer: Arc<BulkBuffer>) {
    while let Some(group) = groups.recv().await {
        debug!("Flush worker received {} document(s)", group.len());
        for document in group {
            if let Err(e) = accept(buffer.add(document).await) {
                error!("Could not buffer document: {}", e);
            }
        }
    }

    if let Err(e) = groups.finished().await {
        error!("Grouping stage terminated abnormally: {}", e);
    }
    debug!("Flush worker stopped");
}

#[async_trait]
impl BgMetadataStorageConnector for ElasticSearchConnector {
    async fn update_metric_metadata(&self, metric: Metric) -> Result<(), StorageError> {
        self.submit(metric.into()).await
    }

    async fn insert_directory(&self, directory: MetricDirectory) -> Result<(), StorageError> {
        self.submit(directory.into()).await
    }

    /// Elasticsearch is not used to check for existence: always a miss
    async fn select_directory(&self, path: &str) -> Result<String, StorageError> {
        Err(StorageError::DirectoryNotFound(path.to_string()))
    }

    /// Drains the grouping stage, waits for the worker, then flushes the
    /// remaining documents
    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);

        if let Ingress::Grouped { sender, worker } = &self.ingress {
            sender.write().await.take();

            let mut worker = worker.lock().await;
            if let Some(handle) = worker.take() {
                if let Err(e) = handle.await {
                    error!("Flush worker terminated abnormally: {}", e);
                }
            }
        }

        match self.buffer.close().await {
            Ok(outcome) => info!("ElasticSearch connector closed ({:?})", outcome),
            Err(e) => error!("Final bulk flush failed: {}", e),
        }
    }
}
