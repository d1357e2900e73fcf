//! Retrieval requests and the HTTP retrieval client.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::backend::{Retriever, DEFAULT_K};
use crate::error::{status_and_body, RetrievalError};

fn default_k() -> usize {
    DEFAULT_K
}

/// A semantic search request: `{"query": ..., "k": 3, "source": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query
    pub query: String,

    /// Number of passages wanted
    #[serde(default = "default_k")]
    pub k: usize,

    /// Restrict results to one ingested source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SearchRequest {
    /// Request with the default `k`.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_K,
            source: None,
        }
    }

    /// Same request with a different `k`.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Same request filtered to `source`.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Reject blank queries and `k == 0`.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.query.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest("query must not be empty".into()));
        }
        if self.k == 0 {
            return Err(RetrievalError::InvalidRequest("k must be at least 1".into()));
        }
        Ok(())
    }

    /// Validate and run against `retriever`.
    pub async fn execute(
        &self,
        retriever: &dyn Retriever,
    ) -> Result<SearchResponse, RetrievalError> {
        self.validate()?;
        let results = retriever
            .search(&self.query, self.k, self.source.as_deref())
            .await?;
        Ok(SearchResponse { results })
    }
}

/// Passages returned for a [`SearchRequest`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Passage texts, best first
    pub results: Vec<String>,
}

/// Client for a retrieval service exposing `POST {endpoint}` with
/// [`SearchRequest`] / [`SearchResponse`] bodies.
#[derive(Clone)]
pub struct HttpRetriever {
    client: Client,
    endpoint: String,
}

impl HttpRetriever {
    /// Create a client for `endpoint` (e.g. `http://localhost:8000/retrieval/`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(
        &self,
        query: &str,
        k: usize,
        source: Option<&str>,
    ) -> Result<Vec<String>, RetrievalError> {
        let mut request = SearchRequest::new(query).with_k(k);
        if let Some(source) = source {
            request = request.with_source(source);
        }
        debug!("Retrieving {} passages from {}", k, self.endpoint);

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(RetrievalError::Status { status, body });
        }

        let data: SearchResponse = response.json().await?;
        Ok(data.results)
    }
}
