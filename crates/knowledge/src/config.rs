//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables (a `.env` file in the working directory is honoured).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{CompletionOptions, Embedder, DEFAULT_K};
use crate::completion::OpenAiCompletionClient;
use crate::embedding::{OllamaEmbeddingClient, OpenAiEmbeddingClient};
use crate::error::{KnowledgeError, Result};
use crate::ingest::DEFAULT_CHUNK_SIZE;
use crate::summarize::SummarizerSettings;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagkitConfig {
    /// Chat completion backend
    pub completion: CompletionConfig,

    /// Embedding backend
    pub embedding: EmbeddingConfig,

    /// Retrieval backend
    pub retrieval: RetrievalConfig,

    /// Document ingestion
    pub ingest: IngestConfig,

    /// Summarization tuning
    pub summarize: SummarizeConfig,

    /// Local storage
    pub storage: StorageConfig,
}

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL, without the `/chat/completions` suffix
    pub base_url: String,

    /// Bearer token
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// Sampling temperature
    pub temperature: f64,

    /// Maximum generated tokens
    pub max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl CompletionConfig {
    /// Build the client.
    pub fn client(&self) -> OpenAiCompletionClient {
        OpenAiCompletionClient::new(&self.base_url, self.api_key.clone(), &self.model)
    }

    /// Default request options.
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system_prompt: None,
        }
    }
}

/// Which embedding API to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Ollama `/api/embeddings`
    #[default]
    Ollama,
    /// OpenAI-compatible `/embeddings`
    OpenAi,
}

/// Embedding endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// API flavour
    pub provider: EmbeddingProvider,

    /// Server URL
    pub url: String,

    /// Bearer token (OpenAI only)
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// Enforced dimension; vectors of any other length are rejected
    pub dimension: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "nomic-embed-text".to_string(),
            dimension: None,
        }
    }
}

impl EmbeddingConfig {
    /// Build the configured embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        match self.provider {
            EmbeddingProvider::Ollama => {
                let client = OllamaEmbeddingClient::new(&self.url, &self.model);
                Arc::new(match self.dimension {
                    Some(d) => client.with_dimension(d),
                    None => client,
                })
            }
            EmbeddingProvider::OpenAi => {
                let client =
                    OpenAiEmbeddingClient::new(&self.url, self.api_key.clone(), &self.model);
                Arc::new(match self.dimension {
                    Some(d) => client.with_dimension(d),
                    None => client,
                })
            }
        }
    }
}

/// Retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// `POST` endpoint; search and chat fail without one
    pub endpoint: Option<String>,

    /// Passages per query
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { endpoint: None, k: DEFAULT_K }
    }
}

/// Document ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Characters per chunk for chunked ingestion
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Summarization tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    /// Characters per chunk in chunked mode
    pub chunk_size: usize,

    /// Token budget before summaries are collapsed
    pub token_max: usize,

    /// Temperature for map and reduce calls
    pub temperature: f64,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        let settings = SummarizerSettings::default();
        Self {
            chunk_size: settings.chunk_size,
            token_max: settings.token_max,
            temperature: settings.temperature,
        }
    }
}

impl SummarizeConfig {
    /// Settings for [`crate::Summarizer`].
    pub fn settings(&self, max_tokens: u32) -> SummarizerSettings {
        SummarizerSettings {
            chunk_size: self.chunk_size,
            token_max: self.token_max,
            temperature: self.temperature,
            max_tokens,
        }
    }
}

/// Local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for the JSON store
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ragkit"),
        }
    }
}

impl RagkitConfig {
    /// Load from `path` (if given and present) plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if dotenvy::dotenv().is_ok() {
            debug!("Loaded environment variables from .env file");
        }

        let mut config = match path {
            Some(p) if p.exists() => Self::from_toml_file(p)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| KnowledgeError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| KnowledgeError::Config(e.to_string()))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.completion.base_url = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY").or_else(|| lookup("GROQ_API_KEY")) {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = lookup("MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = lookup("RAGKIT_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.completion.temperature = v;
        }
        if let Some(v) = lookup("RAGKIT_EMBEDDING_URL") {
            self.embedding.url = v;
        }
        if let Some(v) = lookup("RAGKIT_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("RAGKIT_EMBEDDING_DIMENSION").and_then(|v| v.parse().ok()) {
            self.embedding.dimension = Some(v);
        }
        if let Some(v) = lookup("RAGKIT_RETRIEVAL_URL") {
            self.retrieval.endpoint = Some(v);
        }
        if let Some(v) = lookup("RAGKIT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
    }

    /// Reject values no backend can work with.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.k == 0 {
            return Err(KnowledgeError::Config("retrieval.k must be at least 1".into()));
        }
        if self.summarize.chunk_size == 0 || self.summarize.token_max == 0 {
            return Err(KnowledgeError::Config(
                "summarize.chunk_size and summarize.token_max must be positive".into(),
            ));
        }
        if self.ingest.chunk_size == 0 {
            return Err(KnowledgeError::Config("ingest.chunk_size must be positive".into()));
        }
        if self.embedding.dimension == Some(0) {
            return Err(KnowledgeError::Config("embedding.dimension must be positive".into()));
        }
        Ok(())
    }
}
