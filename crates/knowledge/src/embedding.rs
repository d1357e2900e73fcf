//! Embedding backends.
//!
//! Two HTTP clients: Ollama's `/api/embeddings` and the OpenAI-compatible
//! `/embeddings` endpoint.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::backend::Embedder;
use crate::error::{status_and_body, EmbeddingError};

/// Ollama embedding client.
#[derive(Clone)]
pub struct OllamaEmbeddingClient {
    /// HTTP client
    client: Client,

    /// Ollama server URL
    url: String,

    /// Model name
    model: String,

    /// Expected dimension, if configured
    dimension: Option<usize>,
}

impl OllamaEmbeddingClient {
    /// Create a new Ollama embedding client.
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension: None,
        }
    }

    /// Declare the dimension this model produces.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[async_trait]
impl Embedder for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "prompt": text,
        });

        debug!("Generating embedding for text ({} chars)", text.len());

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(EmbeddingError::Status { status, body });
        }

        #[derive(serde::Deserialize)]
        struct Response {
            embedding: Vec<f32>,
        }

        let data: Response = response.json().await?;
        if data.embedding.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        Ok(data.embedding)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

/// OpenAI-compatible embedding client.
#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: Option<usize>,
}

impl OpenAiEmbeddingClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimension: None,
        }
    }

    /// Declare the dimension this model produces.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self.client.post(format!("{}/embeddings", self.base_url)).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(EmbeddingError::Status { status, body });
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        #[derive(serde::Deserialize)]
        struct Response {
            data: Vec<EmbeddingData>,
        }

        let data: Response = response.json().await?;
        data.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or(EmbeddingError::Empty)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
