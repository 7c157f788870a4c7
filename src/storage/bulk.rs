// Bulk write executor
//
// Serializes a batch, writes it with bounded retry and turns the per-item
// outcome of the bulk response into counters.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::client::{ElasticSearchClient, EsRequest, TransportError};
use super::document::{build_batch, DocumentKind, IndexDocument};
use super::indices::{IndexError, IndexManager, IndexNames};
use super::telemetry::ConnectorMetrics;

/// Errors reported for a whole batch
#[derive(Error, Debug)]
pub enum FlushError {
    #[error("Could not get index: {0}")]
    IndexResolution(#[from] IndexError),

    #[error("Could not write to index: {0}")]
    Transport(#[from] TransportError),

    #[error("Could not write to index after {attempts} attempt(s) (status {status}, error: {body})")]
    Rejected {
        status: u16,
        body: String,
        attempts: u32,
    },
}

/// Subset of the `_bulk` response used for accounting
#[derive(Debug, Deserialize)]
struct BulkResponse {
    took: Option<f64>,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_index")]
    index: String,
    status: u16,
}

/// Per-item outcome of a successful bulk call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutcome {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Writes batches to the cluster
pub struct BulkExecutor {
    client: Arc<dyn ElasticSearchClient>,
    metrics: ConnectorMetrics,
    max_retry: u32,
    retry_backoff: Duration,
}

impl BulkExecutor {
    pub fn new(
        client: Arc<dyn ElasticSearchClient>,
        metrics: ConnectorMetrics,
        max_retry: u32,
        retry_backoff: Duration,
    ) -> Self {
        BulkExecutor {
            client,
            metrics,
            max_retry,
            retry_backoff,
        }
    }

    pub fn client(&self) -> &dyn ElasticSearchClient {
        self.client.as_ref()
    }

    pub fn metrics(&self) -> &ConnectorMetrics {
        &self.metrics
    }

    /// Writes `batch` to today's indices
    ///
    /// # Behavior
    /// - Index resolution failure: batch counted as failed, nothing written
    /// - Transport error: batch counted as failed, no retry
    /// - Non-2xx response: counted per status code, retried up to `max_retry` times
    /// - Success: per-item outcomes counted; failed items are not retried
    pub async fn flush(
        &self,
        batch: &[IndexDocument],
        indices: &mut IndexManager,
    ) -> Result<BulkOutcome, FlushError> {
        if batch.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let names = match indices.current_indices(self.client()).await {
            Ok(names) => names,
            Err(e) => {
                self.metrics.add_documents("failure", "any", batch.len());
                return Err(e.into());
            }
        };

        let build_start = Instant::now();
        let body = build_batch(&names, batch, Utc::now());
        self.metrics
            .document_build_duration_ms
            .observe(build_start.elapsed().as_secs_f64() * 1000.0);

        let mut last_status = 0;
        let mut last_body = String::new();
        let attempts = self.max_retry.saturating_add(1);

        for attempt in 1..=attempts {
            let write_start = Instant::now();
            let response = match self.client.perform(EsRequest::bulk(body.clone())).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Bulk write of {} document(s) failed: {}", batch.len(), e);
                    self.metrics.add_documents("failure", "any", batch.len());
                    return Err(e.into());
                }
            };

            if response.is_success() {
                let outcome = self.reconcile(&response.body, &names, write_start.elapsed());
                debug!(
                    "Flushed {} document(s) on attempt {}: {:?}",
                    batch.len(),
                    attempt,
                    outcome
                );
                return Ok(outcome);
            }

            self.metrics.http_error(response.status);
            warn!(
                "Bulk write rejected with status {} (attempt {}/{})",
                response.status, attempt, attempts
            );
            last_status = response.status;
            last_body = response.body;

            if attempt < attempts && !self.retry_backoff.is_zero() {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        error!(
            "Giving up on {} document(s) after {} attempt(s)",
            batch.len(),
            attempts
        );
        self.metrics.add_documents("failure", "any", batch.len());
        Err(FlushError::Rejected {
            status: last_status,
            body: last_body,
            attempts,
        })
    }

    /// Accounts the items of a successful bulk response
    ///
    /// A body that cannot be parsed is logged; the write itself succeeded.
    fn reconcile(&self, body: &str, names: &IndexNames, elapsed: Duration) -> BulkOutcome {
        let response: BulkResponse = match serde_json::from_str(body) {
            Ok(response) => response,
            Err(e) => {
                warn!("Malformed bulk response: {}", e);
                self.metrics
                    .write_duration_ms
                    .observe(elapsed.as_secs_f64() * 1000.0);
                return BulkOutcome::default();
            }
        };

        let took = response
            .took
            .unwrap_or_else(|| elapsed.as_secs_f64() * 1000.0);
        self.metrics.write_duration_ms.observe(took);

        let mut outcome = BulkOutcome::default();
        for item in response.items.iter().flat_map(|item| item.values()) {
            let kind = if item.index == names.metrics {
                DocumentKind::Metric
            } else {
                DocumentKind::Directory
            };
            let status = match item.status {
                201 => {
                    outcome.created += 1;
                    "created"
                }
                200 => {
                    outcome.updated += 1;
                    "updated"
                }
                _ => {
                    outcome.failed += 1;
                    "failure"
                }
            };
            self.metrics.add_documents(status, kind.as_str(), 1);
        }

        if response.errors || outcome.failed > 0 {
            warn!(
                "{} document(s) rejected inside a successful bulk write",
                outcome.failed
            );
        }
        outcome
    }
}
