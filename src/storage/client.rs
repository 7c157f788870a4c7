// Elasticsearch transport
//
// The connector only needs to perform raw requests against the cluster, so
// the transport is a small trait. The production implementation wraps
// reqwest and rotates over the configured addresses.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised before a response could be obtained from the cluster
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No Elasticsearch address configured")]
    NoAddress,

    #[error("Transport error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Put,
    Post,
}

/// A request relative to the cluster root
#[derive(Debug, Clone, PartialEq)]
pub struct EsRequest {
    pub method: Method,
    /// Path starting with `/`, e.g. `/_bulk`
    pub path: String,
    pub body: Option<String>,
    pub content_type: &'static str,
}

impl EsRequest {
    pub fn put(path: impl Into<String>, body: Option<String>) -> Self {
        EsRequest {
            method: Method::Put,
            path: path.into(),
            body,
            content_type: "application/json",
        }
    }

    pub fn bulk(body: String) -> Self {
        EsRequest {
            method: Method::Post,
            path: "/_bulk".to_string(),
            body: Some(body),
            content_type: "application/x-ndjson",
        }
    }
}

/// Status and body of a cluster response
#[derive(Debug, Clone, PartialEq)]
pub struct EsResponse {
    pub status: u16,
    pub body: String,
}

impl EsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs requests against an Elasticsearch cluster
#[async_trait]
pub trait ElasticSearchClient: Send + Sync {
    async fn perform(&self, request: EsRequest) -> Result<EsResponse, TransportError>;
}

/// reqwest-backed client
///
/// Connection and read timeouts are enforced by the underlying HTTP client.
#[derive(Debug)]
pub struct HttpElasticSearchClient {
    client: reqwest::Client,
    addresses: Vec<String>,
    credentials: Option<(String, Option<String>)>,
    next_address: AtomicUsize,
}

impl HttpElasticSearchClient {
    /// Creates a client for the given cluster addresses
    ///
    /// # Arguments
    /// * `addresses` - Base URLs of the cluster nodes (e.g. "http://localhost:9200")
    /// * `username` / `password` - Optional basic authentication
    /// * `timeout` - Per-request timeout
    pub fn new(
        addresses: Vec<String>,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if addresses.is_empty() {
            return Err(TransportError::NoAddress);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(HttpElasticSearchClient {
            client,
            addresses: addresses
                .into_iter()
                .map(|address| address.trim_end_matches('/').to_string())
                .collect(),
            credentials: username.map(|username| (username, password)),
            next_address: AtomicUsize::new(0),
        })
    }

    fn address(&self) -> &str {
        let index = self.next_address.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        &self.addresses[index]
    }
}

#[async_trait]
impl ElasticSearchClient for HttpElasticSearchClient {
    async fn perform(&self, request: EsRequest) -> Result<EsResponse, TransportError> {
        let url = format!("{}{}", self.address(), request.path);
        debug!("{:?} {}", request.method, url);

        let mut builder = match request.method {
            Method::Put => self.client.put(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some((username, password)) = &self.credentials {
            builder = builder.basic_auth(username, password.as_ref());
        }
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, request.content_type).body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(EsResponse { status, body })
    }
}
