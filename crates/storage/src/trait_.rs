//! Storage trait abstraction.

use async_trait::async_trait;
use ragkit_core::{
    CollectionId, KnowledgeBaseCollection, KnowledgeBaseId, KnowledgeBaseSession, MessageSession,
    ModelError, SessionId, Snapshot,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored entity breaks an entity-model rule
    #[error("invalid stored entity: {0}")]
    Invalid(#[from] ModelError),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persistence adapter for the entity model.
///
/// Backends store whole entities; all consistency rules live in
/// `ragkit_core::Registry`, which is rebuilt from storage with `restore`.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Message session operations ===

    /// Save a message session (create or update).
    async fn save_session(&mut self, session: &MessageSession) -> Result<()>;

    /// Load a message session by ID.
    async fn load_session(&self, id: &SessionId) -> Result<Option<MessageSession>>;

    /// List all message sessions.
    async fn list_sessions(&self) -> Result<Vec<MessageSession>>;

    // === Knowledge base operations ===

    /// Save a knowledge-base session.
    async fn save_knowledge_base(&mut self, kb: &KnowledgeBaseSession) -> Result<()>;

    /// Load a knowledge-base session by ID.
    async fn load_knowledge_base(
        &self,
        id: &KnowledgeBaseId,
    ) -> Result<Option<KnowledgeBaseSession>>;

    /// List all knowledge-base sessions.
    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSession>>;

    // === Collection operations ===

    /// Save a collection.
    async fn save_collection(&mut self, collection: &KnowledgeBaseCollection) -> Result<()>;

    /// Load a collection by ID.
    async fn load_collection(&self, id: &CollectionId) -> Result<Option<KnowledgeBaseCollection>>;

    /// List all collections.
    async fn list_collections(&self) -> Result<Vec<KnowledgeBaseCollection>>;

    // === Transaction support ===

    /// Commit pending changes with a message.
    async fn commit(&mut self, message: &str) -> Result<()>;

    /// Rollback pending changes.
    async fn rollback(&mut self) -> Result<()>;

    // === Snapshots ===

    /// Load every stored entity.
    async fn load_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            sessions: self.list_sessions().await?,
            knowledge_bases: self.list_knowledge_bases().await?,
            collections: self.list_collections().await?,
        })
    }

    /// Save every entity in `snapshot`.
    async fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
        for kb in &snapshot.knowledge_bases {
            self.save_knowledge_base(kb).await?;
        }
        for collection in &snapshot.collections {
            self.save_collection(collection).await?;
        }
        for session in &snapshot.sessions {
            self.save_session(session).await?;
        }
        Ok(())
    }
}
