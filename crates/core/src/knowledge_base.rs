//! Knowledge-base sessions and the collections that group them.
//!
//! A collection owns an ordered, duplicate-free set of knowledge-base
//! session ids. Each knowledge-base session points back to at most one
//! collection through `collection_id`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::id::{CollectionId, KnowledgeBaseId};
use crate::validation::{require_non_empty, validate_embedding};
use crate::Time;

/// An ingested, embedded document. Immutable except for `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseSession {
    id: KnowledgeBaseId,
    embedding: Vec<f32>,
    document: String,
    metadata: String,
    created_at: Time,
    #[serde(default)]
    collection_id: Option<CollectionId>,
}

impl KnowledgeBaseSession {
    /// Build a validated knowledge-base session.
    ///
    /// `expected_dimension` is the embedding backend's dimensionality, when known.
    pub fn new(
        id: KnowledgeBaseId,
        embedding: Vec<f32>,
        document: impl Into<String>,
        metadata: impl Into<String>,
        created_at: Time,
        expected_dimension: Option<usize>,
    ) -> Result<Self> {
        let document = document.into();
        require_non_empty("id", id.as_str())?;
        validate_embedding(&embedding, expected_dimension)?;
        require_non_empty("document", &document)?;

        Ok(Self {
            id,
            embedding,
            document,
            metadata: metadata.into(),
            created_at,
            collection_id: None,
        })
    }

    /// Id
    pub fn id(&self) -> &KnowledgeBaseId {
        &self.id
    }

    /// Embedding vector
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Embedding dimensionality
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }

    /// Source document text
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Opaque metadata (usually serialized JSON)
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Metadata parsed as JSON, if it is JSON.
    pub fn metadata_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.metadata).ok()
    }

    /// Creation time
    pub fn created_at(&self) -> Time {
        self.created_at
    }

    /// Owning collection, if any
    pub fn collection_id(&self) -> Option<&CollectionId> {
        self.collection_id.as_ref()
    }

    /// Replace the metadata. The only permitted mutation.
    pub fn set_metadata(&mut self, metadata: impl Into<String>) {
        self.metadata = metadata.into();
    }
}

/// A named group of knowledge-base sessions. Membership only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseCollection {
    id: CollectionId,
    name: String,
    metadata: String,
    #[serde(default)]
    sessions: Vec<KnowledgeBaseId>,
    created_at: Time,
}

impl KnowledgeBaseCollection {
    /// Build a validated, empty collection.
    pub fn new(
        id: CollectionId,
        name: impl Into<String>,
        metadata: impl Into<String>,
        created_at: Time,
    ) -> Result<Self> {
        let name = name.into();
        require_non_empty("id", id.as_str())?;
        require_non_empty("name", &name)?;

        Ok(Self {
            id,
            name,
            metadata: metadata.into(),
            sessions: Vec::new(),
            created_at,
        })
    }

    /// Id
    pub fn id(&self) -> &CollectionId {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque metadata
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Creation time
    pub fn created_at(&self) -> Time {
        self.created_at
    }

    /// Member ids in insertion order
    pub fn sessions(&self) -> &[KnowledgeBaseId] {
        &self.sessions
    }

    /// Whether `id` is a member
    pub fn contains(&self, id: &KnowledgeBaseId) -> bool {
        self.sessions.contains(id)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when there are no members
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Add `kb_session` to `collection`.
///
/// Idempotent: returns `Ok(false)` when the session is already a member.
/// Fails with `InvariantViolation` when the session belongs to another collection.
pub fn add_session_to_collection(
    collection: &mut KnowledgeBaseCollection,
    kb_session: &mut KnowledgeBaseSession,
) -> Result<bool> {
    match &kb_session.collection_id {
        Some(owner) if owner != &collection.id => {
            return Err(ModelError::invariant(format!(
                "knowledge base session `{}` already belongs to collection `{}`",
                kb_session.id, owner
            )));
        }
        _ => {}
    }

    kb_session.collection_id = Some(collection.id.clone());
    if collection.contains(&kb_session.id) {
        return Ok(false);
    }

    debug!("Adding {} to collection {}", kb_session.id, collection.id);
    collection.sessions.push(kb_session.id.clone());
    Ok(true)
}
