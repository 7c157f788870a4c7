// Index lifecycle - daily index names, lazy creation and mapping
//
// Both indices are rotated every UTC day. An index is created and mapped the
// first time a flush targets it, then remembered until the process exits.

use chrono::{NaiveDate, Utc};
use futures_util::future::try_join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use super::client::{ElasticSearchClient, EsRequest, TransportError};
use super::document::DOCUMENT_TYPE;

/// Base index name used when none is configured.
pub const DEFAULT_INDEX_NAME: &str = "biggraphite_metrics";

const DIRECTORIES_INDEX_SUFFIX: &str = "_directories";
const INDEX_DATE_FORMAT: &str = "_%Y-%m-%d";

/// Errors that prevent the daily indices from being resolved
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Could not set ElasticSearch mapping on {index}: {source}")]
    Transport {
        index: String,
        #[source]
        source: TransportError,
    },

    #[error("Could not set ElasticSearch mapping on {index} (status {status}, error: {body})")]
    Mapping {
        index: String,
        status: u16,
        body: String,
    },
}

/// Names of the metric and directory indices for one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub metrics: String,
    pub directories: String,
}

impl IndexNames {
    pub fn for_date(base: &str, date: NaiveDate) -> Self {
        let suffix = date.format(INDEX_DATE_FORMAT).to_string();
        IndexNames {
            metrics: format!("{}{}", base, suffix),
            directories: format!("{}{}{}", base, DIRECTORIES_INDEX_SUFFIX, suffix),
        }
    }

    /// Names of today's indices (UTC)
    pub fn current(base: &str) -> Self {
        Self::for_date(base, Utc::now().date_naive())
    }
}

/// Field mapping shared by both indices, plus the kind-specific properties
fn mapping(specific: (&str, Value)) -> Value {
    let mut properties = json!({
        "depth": { "type": "long" },
        "name": { "type": "keyword", "ignore_above": 1024 },
        "uuid": { "type": "keyword" },
    });
    properties[specific.0] = specific.1;

    json!({
        DOCUMENT_TYPE: {
            "properties": properties,
            "dynamic_templates": [
                {
                    "strings_as_keywords": {
                        "match": "p*",
                        "match_mapping_type": "string",
                        "mapping": {
                            "type": "keyword",
                            "ignore_above": 256,
                            "ignore_malformed": true
                        }
                    }
                }
            ]
        }
    })
}

pub fn metrics_mapping() -> Value {
    mapping(("config", json!({ "type": "object" })))
}

pub fn directories_mapping() -> Value {
    mapping(("parent", json!({ "type": "keyword" })))
}

/// Tracks which indices are known to exist and creates the missing ones
#[derive(Debug)]
pub struct IndexManager {
    base_name: String,
    known_indices: HashMap<String, bool>,
}

impl IndexManager {
    pub fn new(base_name: &str) -> Self {
        let base_name = if base_name.is_empty() {
            DEFAULT_INDEX_NAME
        } else {
            base_name
        };
        IndexManager {
            base_name: base_name.to_string(),
            known_indices: HashMap::new(),
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn resolve_indices(&self) -> IndexNames {
        IndexNames::current(&self.base_name)
    }

    pub fn is_known(&self, index: &str) -> bool {
        self.known_indices.get(index).copied().unwrap_or(false)
    }

    pub fn known_count(&self) -> usize {
        self.known_indices.len()
    }

    /// Resolves today's indices, creating them if needed
    pub async fn current_indices(
        &mut self,
        client: &dyn ElasticSearchClient,
    ) -> Result<IndexNames, IndexError> {
        let names = self.resolve_indices();
        self.ensure_indices(client, &names).await?;
        Ok(names)
    }

    /// Creates and maps every index in `names` not yet known
    ///
    /// A failed create (usually "already exists") is ignored; the mapping
    /// call decides whether the index is usable. Names are only remembered
    /// once their mapping succeeded.
    pub async fn ensure_indices(
        &mut self,
        client: &dyn ElasticSearchClient,
        names: &IndexNames,
    ) -> Result<(), IndexError> {
        let pending: Vec<(&str, Value)> = [
            (names.metrics.as_str(), metrics_mapping()),
            (names.directories.as_str(), directories_mapping()),
        ]
        .into_iter()
        .filter(|(index, _)| !self.is_known(index))
        .collect();

        if pending.is_empty() {
            return Ok(());
        }

        let created = try_join_all(
            pending
                .into_iter()
                .map(|(index, mapping)| create_index(client, index, mapping)),
        )
        .await?;

        for index in created {
            info!("Index {} is ready", index);
            self.known_indices.insert(index, true);
        }
        Ok(())
    }
}

async fn create_index(
    client: &dyn ElasticSearchClient,
    index: &str,
    mapping: Value,
) -> Result<String, IndexError> {
    match client.perform(EsRequest::put(format!("/{}", index), None)).await {
        Ok(response) if response.is_success() => debug!("Created index {}", index),
        Ok(response) => debug!(
            "Index {} not created (status {}), assuming it exists",
            index, response.status
        ),
        Err(e) => debug!("Index {} not created: {}", index, e),
    }

    let request = EsRequest::put(
        format!("/{}/_mapping/{}", index, DOCUMENT_TYPE),
        Some(mapping.to_string()),
    );
    let response = client
        .perform(request)
        .await
        .map_err(|source| IndexError::Transport {
            index: index.to_string(),
            source,
        })?;

    if !response.is_success() {
        return Err(IndexError::Mapping {
            index: index.to_string(),
            status: response.status,
            body: response.body,
        });
    }
    Ok(index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::client::Method;
    use crate::storage::testing::FakeClient;

    #[test]
    fn test_index_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let names = IndexNames::for_date("biggraphite_metrics", date);
        assert_eq!(names.metrics, "biggraphite_metrics_2024-03-07");
        assert_eq!(names.directories, "biggraphite_metrics_directories_2024-03-07");
    }

    #[test]
    fn test_empty_base_name_uses_default() {
        assert_eq!(IndexManager::new("").base_name(), DEFAULT_INDEX_NAME);
        assert_eq!(IndexManager::new("custom").base_name(), "custom");
    }

    #[test]
    fn test_mappings() {
        let metrics = metrics_mapping();
        let properties = &metrics["_doc"]["properties"];
        assert_eq!(properties["name"]["ignore_above"], 1024);
        assert_eq!(properties["config"]["type"], "object");
        assert!(properties.get("parent").is_none());

        let directories = directories_mapping();
        assert_eq!(directories["_doc"]["properties"]["parent"]["type"], "keyword");
        let template = &directories["_doc"]["dynamic_templates"][0]["strings_as_keywords"];
        assert_eq!(template["match"], "p*");
        assert_eq!(template["mapping"]["ignore_above"], 256);
    }

    #[tokio::test]
    async fn test_creates_indices_once() {
        let client = FakeClient::accepting();
        let mut manager = IndexManager::new("test");
        let names = manager.resolve_indices();

        manager.ensure_indices(client.as_ref(), &names).await.unwrap();
        assert_eq!(client.requests().len(), 4);
        assert!(manager.is_known(&names.metrics));
        assert!(manager.is_known(&names.directories));

        manager.ensure_indices(client.as_ref(), &names).await.unwrap();
        assert_eq!(client.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_new_day_creates_new_indices() {
        let client = FakeClient::accepting();
        let mut manager = IndexManager::new("test");
        let day1 = IndexNames::for_date("test", NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        let day2 = IndexNames::for_date("test", NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());

        manager.ensure_indices(client.as_ref(), &day1).await.unwrap();
        assert_eq!(client.requests().len(), 4);

        manager.ensure_indices(client.as_ref(), &day2).await.unwrap();
        let requests = client.requests();
        assert_eq!(requests.len(), 8);
        let day2_paths: Vec<&str> = requests[4..].iter().map(|r| r.path.as_str()).collect();
        assert!(day2_paths.contains(&"/test_2024-03-08"));
        assert!(day2_paths.contains(&"/test_2024-03-08/_mapping/_doc"));
        assert!(day2_paths.contains(&"/test_directories_2024-03-08"));
        assert!(day2_paths.contains(&"/test_directories_2024-03-08/_mapping/_doc"));

        assert!(manager.is_known(&day1.metrics));
        assert!(manager.is_known(&day1.directories));
        assert!(manager.is_known(&day2.metrics));
        assert_eq!(manager.known_count(), 4);

        manager.ensure_indices(client.as_ref(), &day2).await.unwrap();
        manager.ensure_indices(client.as_ref(), &day1).await.unwrap();
        assert_eq!(client.requests().len(), 8);
    }

    #[tokio::test]
    async fn test_create_conflict_is_ignored() {
        let client = FakeClient::new(|request| {
            if request.path.contains("_mapping") {
                Ok(FakeClient::response(200, "{}"))
            } else {
                Ok(FakeClient::response(400, "resource_already_exists_exception"))
            }
        });
        let mut manager = IndexManager::new("test");

        let names = manager.current_indices(client.as_ref()).await.unwrap();
        assert!(manager.is_known(&names.metrics));

        let mapping_calls: Vec<_> = client
            .requests()
            .into_iter()
            .filter(|request| request.path.ends_with("/_mapping/_doc"))
            .collect();
        assert_eq!(mapping_calls.len(), 2);
        assert!(mapping_calls.iter().all(|request| request.method == Method::Put));
    }

    #[tokio::test]
    async fn test_mapping_failure_is_not_cached() {
        let client = FakeClient::new(|request| {
            if request.path.contains("_mapping") {
                Ok(FakeClient::response(500, "boom"))
            } else {
                Ok(FakeClient::response(200, "{}"))
            }
        });
        let mut manager = IndexManager::new("test");
        let names = manager.resolve_indices();

        let result = manager.ensure_indices(client.as_ref(), &names).await;
        assert!(matches!(result, Err(IndexError::Mapping { status: 500, .. })));
        assert!(!manager.is_known(&names.metrics));
        assert_eq!(manager.known_count(), 0);
    }

    #[tokio::test]
    async fn test_mapping_transport_failure() {
        let client = FakeClient::new(|_| Err(TransportError::Other("unreachable".to_string())));
        let mut manager = IndexManager::new("test");

        let result = manager.current_indices(client.as_ref()).await;
        assert!(matches!(result, Err(IndexError::Transport { .. })));
        assert_eq!(manager.known_count(), 0);
    }
}
