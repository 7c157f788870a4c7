// Scripted Elasticsearch client for tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use super::client::{ElasticSearchClient, EsRequest, EsResponse, TransportError};

type Handler = dyn Fn(&EsRequest) -> Result<EsResponse, TransportError> + Send + Sync;

/// Records every request and answers with the given handler
pub struct FakeClient {
    handler: Box<Handler>,
    requests: Mutex<Vec<EsRequest>>,
}

impl FakeClient {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&EsRequest) -> Result<EsResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(FakeClient {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Accepts index management calls and creates every bulk item
    pub fn accepting() -> Arc<Self> {
        Self::new(|request| {
            if request.path == "/_bulk" {
                Ok(Self::bulk_response(request, 201))
            } else {
                Ok(Self::response(200, r#"{"acknowledged":true}"#))
            }
        })
    }

    /// Accepts index management calls, answers bulk calls with `bulk`
    pub fn with_bulk<F>(bulk: F) -> Arc<Self>
    where
        F: Fn(&EsRequest) -> Result<EsResponse, TransportError> + Send + Sync + 'static,
    {
        Self::new(move |request| {
            if request.path == "/_bulk" {
                bulk(request)
            } else {
                Ok(Self::response(200, r#"{"acknowledged":true}"#))
            }
        })
    }

    pub fn response(status: u16, body: &str) -> EsResponse {
        EsResponse {
            status,
            body: body.to_string(),
        }
    }

    /// Builds a bulk response giving every action of `request` the same status
    pub fn bulk_response(request: &EsRequest, status: u16) -> EsResponse {
        let items: Vec<Value> = Self::bulk_actions(request)
            .into_iter()
            .map(|action| {
                json!({
                    "index": {
                        "_index": action["index"]["_index"],
                        "_id": action["index"]["_id"],
                        "status": status,
                    }
                })
            })
            .collect();
        let body = json!({ "took": 3, "errors": status >= 300, "items": items });
        Self::response(200, &body.to_string())
    }

    /// Action lines of a bulk request
    pub fn bulk_actions(request: &EsRequest) -> Vec<Value> {
        request
            .body
            .as_deref()
            .unwrap_or_default()
            .lines()
            .step_by(2)
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn requests(&self) -> Vec<EsRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bulk_requests(&self) -> Vec<EsRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == "/_bulk")
            .collect()
    }
}

#[async_trait]
impl ElasticSearchClient for FakeClient {
    async fn perform(&self, request: EsRequest) -> Result<EsResponse, TransportError> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }
}
