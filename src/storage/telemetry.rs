//! Prometheus instruments of the Elasticsearch connector

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use tracing::warn;

const NAMESPACE: &str = "elasticsearch";

/// Counters and histograms updated by the bulk executor
#[derive(Clone)]
pub struct ConnectorMetrics {
    /// Documents written, by `status` (created/updated/failure) and `type`
    /// (metric/directory/any)
    pub updated_documents: IntCounterVec,

    /// HTTP errors returned by the cluster, by status `code`
    pub http_errors: IntCounterVec,

    /// Bulk write duration, from the response `took` field when present
    pub write_duration_ms: Histogram,

    /// Time spent rendering a bulk body
    pub document_build_duration_ms: Histogram,
}

impl ConnectorMetrics {
    /// Creates the instruments and registers them on `registry`
    ///
    /// Registration failures (typically a second connector on the same
    /// registry) are logged; the instruments keep working unregistered.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = ConnectorMetrics {
            updated_documents: IntCounterVec::new(
                Opts::new(
                    "updated_documents",
                    "total number of documents updated in ElasticSearch partitioned between metrics and directories",
                )
                .namespace(NAMESPACE),
                &["status", "type"],
            )?,
            http_errors: IntCounterVec::new(
                Opts::new(
                    "http_errors",
                    "total number of http errors encountered partitioned by status code",
                )
                .namespace(NAMESPACE),
                &["code"],
            )?,
            write_duration_ms: Histogram::with_opts(
                HistogramOpts::new(
                    "write_duration_ms",
                    "time spent writing to ElasticSearch based on `took` field of response",
                )
                .namespace(NAMESPACE)
                .buckets(vec![250.0, 500.0, 750.0, 1000.0, 1500.0, 2000.0, 5000.0, 10000.0]),
            )?,
            document_build_duration_ms: Histogram::with_opts(
                HistogramOpts::new(
                    "document_build_duration_ms",
                    "time spent building an ElasticSearch document",
                )
                .namespace(NAMESPACE)
                .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2000.0]),
            )?,
        };

        let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
            Box::new(metrics.updated_documents.clone()),
            Box::new(metrics.http_errors.clone()),
            Box::new(metrics.write_duration_ms.clone()),
            Box::new(metrics.document_build_duration_ms.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                warn!("Could not register connector metric: {}", e);
            }
        }

        Ok(metrics)
    }

    pub fn documents(&self, status: &str, kind: &str) -> u64 {
        self.updated_documents.with_label_values(&[status, kind]).get()
    }

    pub fn add_documents(&self, status: &str, kind: &str, count: usize) {
        self.updated_documents
            .with_label_values(&[status, kind])
            .inc_by(count as u64);
    }

    pub fn http_error(&self, code: u16) {
        self.http_errors.with_label_values(&[&code.to_string()]).inc();
    }
}
