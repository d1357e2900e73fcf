//! Retrieval-augmented generation services for ragkit.
//!
//! Collaborator seams ([`Retriever`], [`Completer`], [`Embedder`]) with
//! HTTP implementations, plus the services built on them: document
//! ingestion, grounded chat and summarization.

#![warn(missing_docs)]

pub mod backend;
pub mod error;

// HTTP backends
pub mod completion;
pub mod embedding;
pub mod retrieval;

// Services
pub mod chat;
pub mod config;
pub mod ingest;
pub mod prompt;
pub mod summarize;

pub use backend::{ChunkStream, Completer, CompletionOptions, Embedder, Retriever, DEFAULT_K};
pub use error::{CompletionError, EmbeddingError, KnowledgeError, Result, RetrievalError};

pub use completion::OpenAiCompletionClient;
pub use embedding::{OllamaEmbeddingClient, OpenAiEmbeddingClient};
pub use retrieval::{HttpRetriever, SearchRequest, SearchResponse};

pub use chat::{ChatService, ReplyStream};
pub use config::RagkitConfig;
pub use ingest::{Ingestor, DEFAULT_CHUNK_SIZE};
pub use prompt::PromptTemplate;
pub use summarize::{ChunkedSummary, Summarizer, SummarizerSettings};
