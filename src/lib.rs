//! Metric metadata indexer
//!
//! Records every metric observed by the relay, and every directory implied
//! by its dotted name, in daily Elasticsearch indices so the namespace can be
//! browsed downstream.
//!
//! # Overview
//! - [`storage::metric`]: metric and directory entities with deterministic ids
//! - [`storage::grouping`]: fixed-size grouping stage
//! - [`storage::buffer`]: bulk buffer flushed at capacity
//! - [`storage::indices`]: daily index creation and mapping
//! - [`storage::bulk`]: bulk writes with retry and accounting
//! - [`storage::elasticsearch`]: the connector behind [`storage::BgMetadataStorageConnector`]

pub mod config;
pub mod storage;

pub use config::{BatchingMode, ConfigError, IndexerSettings};
pub use storage::metric::{Metric, MetricDirectory, MetricMetadata};
pub use storage::{create_connector, BgMetadataStorageConnector, StorageConnector, StorageError};
