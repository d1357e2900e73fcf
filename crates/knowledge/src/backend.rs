//! Collaborator seams: retrieval, completion and embedding backends.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{CompletionError, EmbeddingError, RetrievalError};

/// Default number of passages to retrieve.
pub const DEFAULT_K: usize = 3;

/// A stream of completion text fragments.
pub type ChunkStream = BoxStream<'static, Result<String, CompletionError>>;

/// Fetches passages relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages for `query`, best first. With `source`,
    /// only passages ingested from that source qualify.
    async fn search(
        &self,
        query: &str,
        k: usize,
        source: Option<&str>,
    ) -> Result<Vec<String>, RetrievalError>;
}

/// Generation settings passed to a [`Completer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature
    pub temperature: f64,

    /// Upper bound on generated tokens
    pub max_tokens: u32,

    /// Optional system instruction sent before the prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: None,
        }
    }
}

impl CompletionOptions {
    /// Same options with a different temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Same options with a system instruction.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Produces text from a prompt.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete `prompt` in one response.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError>;

    /// Complete `prompt`, yielding fragments as they arrive.
    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<ChunkStream, CompletionError>;
}

/// Turns text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimensionality of produced vectors, when known up front.
    fn dimension(&self) -> Option<usize>;
}
