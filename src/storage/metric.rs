// Metric and directory entities
//
// Both entities are identified by a UUID v5 computed over a fixed namespace
// and their sanitized dotted path, so re-indexing the same name always lands
// on the same document.

use std::collections::HashMap;
use uuid::Uuid;

/// Namespace shared by every metric and directory identifier.
const METRIC_NAMESPACE: Uuid = Uuid::from_u128(0x0000_0000_1111_2222_3333_4444_4444_4444);

/// Path separator of metric names.
pub const SEPARATOR: char = '.';

/// Collapses runs of separators and strips leading/trailing ones.
///
/// The result never contains an empty segment, and applying it twice is a
/// no-op.
///
/// # Example
/// ```
/// use bgmetadata_indexer::storage::metric::sanitize_name;
/// assert_eq!(sanitize_name("a..b...c."), "a.b.c");
/// ```
pub fn sanitize_name(name: &str) -> String {
    name.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Content-addressed identifier of a sanitized path.
pub fn path_uuid(sanitized_name: &str) -> Uuid {
    Uuid::new_v5(&METRIC_NAMESPACE, sanitized_name.as_bytes())
}

/// Retention and aggregation settings resolved for a metric
///
/// Resolution against the storage-schemas/aggregation rules happens
/// upstream; this only carries the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricMetadata {
    pub aggregator: String,
    pub carbon_xfilesfactor: String,
    pub retention: String,
}

impl MetricMetadata {
    pub fn new(
        aggregator: impl Into<String>,
        carbon_xfilesfactor: impl Into<String>,
        retention: impl Into<String>,
    ) -> Self {
        MetricMetadata {
            aggregator: aggregator.into(),
            carbon_xfilesfactor: carbon_xfilesfactor.into(),
            retention: retention.into(),
        }
    }

    /// Returns the non-empty settings keyed by their document field name
    pub fn to_map(&self) -> HashMap<String, String> {
        [
            ("aggregator", &self.aggregator),
            ("carbon_xfilesfactor", &self.carbon_xfilesfactor),
            ("retention", &self.retention),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
    }
}

/// A metric observed by the relay
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    id: Uuid,
    created_on: Uuid,
    updated_on: Uuid,
    config: HashMap<String, String>,
}

impl Metric {
    /// Creates a metric from its raw name and resolved metadata.
    ///
    /// The name is sanitized before the identifier is derived from it.
    pub fn new(name: &str, metadata: &MetricMetadata) -> Self {
        let name = sanitize_name(name);
        let id = path_uuid(&name);
        Metric {
            name,
            id,
            created_on: Uuid::now_v7(),
            updated_on: Uuid::now_v7(),
            config: metadata.to_map(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_on(&self) -> Uuid {
        self.created_on
    }

    pub fn updated_on(&self) -> Uuid {
        self.updated_on
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }

    /// Path segments of the name, root first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.name.split(SEPARATOR)
    }
}

/// An intermediate node of the metric namespace (e.g. `a` or `a.b` for `a.b.c`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDirectory {
    name: String,
    id: Uuid,
    parent: String,
}

impl MetricDirectory {
    pub fn new(name: &str) -> Self {
        let name = sanitize_name(name);
        let parent = match name.rfind(SEPARATOR) {
            Some(pos) => name[..pos].to_string(),
            None => String::new(),
        };
        MetricDirectory {
            id: path_uuid(&name),
            name,
            parent,
        }
    }

    /// Decomposes a metric name into the chain of directories containing it
    ///
    /// # Example
    /// `a.b.c` yields `a` then `a.b`; a single-segment name yields nothing.
    pub fn ancestors_of(metric_name: &str) -> Vec<MetricDirectory> {
        let name = sanitize_name(metric_name);
        name.match_indices(SEPARATOR)
            .map(|(pos, _)| MetricDirectory::new(&name[..pos]))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Dotted path of the parent directory, empty at the root
    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.name.split(SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_separators() {
        assert_eq!(sanitize_name("a..b"), "a.b");
        assert_eq!(sanitize_name("a.....b.c"), "a.b.c");
        assert_eq!(sanitize_name(".a.b."), "a.b");
        assert_eq!(sanitize_name("a.b.c"), "a.b.c");
        assert_eq!(sanitize_name(""), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for name in ["a..b", "...", "x.y...z..", ".a", "plain", "a.b.c"] {
            let once = sanitize_name(name);
            assert_eq!(sanitize_name(&once), once);
            assert!(!once.contains(".."));
        }
    }

    #[test]
    fn test_identity_is_deterministic() {
        let metadata = MetricMetadata::default();
        let first = Metric::new("a.b.c", &metadata);
        let second = Metric::new("a..b.c", &metadata);
        let other = Metric::new("a.b.d", &metadata);

        assert_eq!(first.id(), second.id());
        assert_ne!(first.id(), other.id());
        assert_eq!(first.id().get_version_num(), 5);
    }

    #[test]
    fn test_metric_and_directory_share_identity_scheme() {
        let metric = Metric::new("a.b", &MetricMetadata::default());
        let directory = MetricDirectory::new("a.b");
        assert_eq!(metric.id(), directory.id());
    }

    #[test]
    fn test_time_ordered_ids() {
        let metric = Metric::new("a.b.c", &MetricMetadata::default());
        assert_eq!(metric.created_on().get_version_num(), 7);
        assert!(metric.created_on() <= metric.updated_on());
    }

    #[test]
    fn test_metadata_map_skips_empty_values() {
        let metadata = MetricMetadata::new("sum", "", "60s:1d");
        let map = metadata.to_map();

        assert_eq!(map.len(), 2);
        assert_eq!(map["aggregator"], "sum");
        assert_eq!(map["retention"], "60s:1d");
        assert!(!map.contains_key("carbon_xfilesfactor"));
    }

    #[test]
    fn test_directory_parent() {
        assert_eq!(MetricDirectory::new("a").parent(), "");
        assert_eq!(MetricDirectory::new("a.b").parent(), "a");
        assert_eq!(MetricDirectory::new("a.b.c").parent(), "a.b");
    }

    #[test]
    fn test_ancestors_of() {
        let names: Vec<_> = MetricDirectory::ancestors_of("a.b.c")
            .iter()
            .map(|dir| dir.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "a.b"]);

        assert!(MetricDirectory::ancestors_of("root").is_empty());
        assert_eq!(MetricDirectory::ancestors_of("a...b.c").len(), 2);
    }
}
