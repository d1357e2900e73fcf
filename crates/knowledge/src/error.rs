//! Collaborator and orchestration errors.

use ragkit_core::ModelError;

/// Result alias for orchestration operations.
pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// Failure reported by a retrieval backend.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Transport failure
    #[error("retrieval request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the backend
    #[error("retrieval backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Request rejected before it was sent
    #[error("invalid retrieval request: {0}")]
    InvalidRequest(String),
}

/// Failure reported by a completion backend.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Transport failure
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the backend
    #[error("completion backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response could not be decoded
    #[error("malformed completion response: {0}")]
    Malformed(String),

    /// Response contained no choices
    #[error("completion backend returned no choices")]
    Empty,
}

/// Failure reported by an embedding backend.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Transport failure
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the backend
    #[error("embedding backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response contained no vector
    #[error("embedding backend returned no vector")]
    Empty,

    /// Vector length differs from the dimension the backend declares
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Declared dimension
        expected: usize,
        /// Received dimension
        actual: usize,
    },
}

/// Errors from the orchestration layer. Collaborator failures are carried
/// through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    /// Entity-model rule rejected the operation
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Retrieval backend failure
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Completion backend failure
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Embedding backend failure
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Prompt template could not be rendered
    #[error("prompt template is missing variable `{0}`")]
    MissingVariable(String),

    /// Prompt template could not be parsed
    #[error("invalid prompt template: {0}")]
    Template(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

/// Read a failed response into a `(status, body)` pair.
pub(crate) async fn status_and_body(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}
