// Index document rendering
//
// Turns metrics and directories into Elasticsearch document bodies and
// assembles batches into the NDJSON body expected by the `_bulk` endpoint.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::indices::IndexNames;
use super::metric::{Metric, MetricDirectory};

/// Mapping type used by every index and bulk action.
pub const DOCUMENT_TYPE: &str = "_doc";

/// Defaults merged into every metric config when the metric lacks them.
const DEFAULT_CONFIG: [(&str, &str); 2] = [("retention", "10080*60s"), ("aggregator", "average")];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Kind of an indexed document, used to pick the target index and to label
/// counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Metric,
    Directory,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Metric => "metric",
            DocumentKind::Directory => "directory",
        }
    }
}

/// Anything that can be written to the metadata indices
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDocument {
    Metric(Metric),
    Directory(MetricDirectory),
}

impl From<Metric> for IndexDocument {
    fn from(metric: Metric) -> Self {
        IndexDocument::Metric(metric)
    }
}

impl From<MetricDirectory> for IndexDocument {
    fn from(directory: MetricDirectory) -> Self {
        IndexDocument::Directory(directory)
    }
}

impl IndexDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            IndexDocument::Metric(_) => DocumentKind::Metric,
            IndexDocument::Directory(_) => DocumentKind::Directory,
        }
    }

    /// Stable document identifier (`_id`)
    pub fn id(&self) -> Uuid {
        match self {
            IndexDocument::Metric(metric) => metric.id(),
            IndexDocument::Directory(directory) => directory.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IndexDocument::Metric(metric) => metric.name(),
            IndexDocument::Directory(directory) => directory.name(),
        }
    }

    /// Name of the index this document belongs to
    pub fn target_index<'a>(&self, names: &'a IndexNames) -> &'a str {
        match self.kind() {
            DocumentKind::Metric => &names.metrics,
            DocumentKind::Directory => &names.directories,
        }
    }

    /// Renders the document body
    ///
    /// # Document Structure
    /// ```json
    /// {
    ///   "name": "a.b.c",
    ///   "depth": "2",
    ///   "uuid": "…",
    ///   "created_on": "2024-01-15T10:30:00.000000",
    ///   "updated_on": "2024-01-15T10:30:00.000000",
    ///   "read_on": null,
    ///   "config": { "retention": "10080*60s", "aggregator": "average" },
    ///   "p0": "a", "p1": "b", "p2": "c"
    /// }
    /// ```
    /// Directories carry `parent` instead of `config`. Timestamps are stamped
    /// with `now`, so a re-index bumps `updated_on`.
    pub fn render(&self, now: DateTime<Utc>) -> Value {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let mut body = Map::new();

        body.insert("name".to_string(), json!(self.name()));
        body.insert("uuid".to_string(), json!(self.id().to_string()));
        body.insert("created_on".to_string(), json!(timestamp));
        body.insert("updated_on".to_string(), json!(timestamp));
        body.insert("read_on".to_string(), Value::Null);

        let segments: Vec<&str> = match self {
            IndexDocument::Metric(metric) => {
                let mut config: Map<String, Value> = metric
                    .config()
                    .iter()
                    .map(|(key, value)| (key.clone(), json!(value)))
                    .collect();
                for (key, value) in DEFAULT_CONFIG {
                    config.entry(key).or_insert_with(|| json!(value));
                }
                body.insert("config".to_string(), Value::Object(config));
                metric.segments().collect()
            }
            IndexDocument::Directory(directory) => {
                body.insert("parent".to_string(), json!(directory.parent()));
                directory.segments().collect()
            }
        };

        let depth = segments.len().saturating_sub(1);
        body.insert("depth".to_string(), json!(depth.to_string()));
        for (i, segment) in segments.iter().enumerate() {
            body.insert(format!("p{}", i), json!(segment));
        }

        Value::Object(body)
    }

    fn action_line(&self, names: &IndexNames) -> Value {
        json!({
            "index": {
                "_index": self.target_index(names),
                "_type": DOCUMENT_TYPE,
                "_id": self.id().to_string(),
            }
        })
    }
}

/// Builds the NDJSON `_bulk` body for a batch, in batch order
///
/// Each document contributes an action line routing it to its index and the
/// rendered document line.
pub fn build_batch(names: &IndexNames, documents: &[IndexDocument], now: DateTime<Utc>) -> String {
    let mut body = String::new();
    for document in documents {
        body.push_str(&document.action_line(names).to_string());
        body.push('\n');
        body.push_str(&document.render(now).to_string());
        body.push('\n');
    }
    body
}
