//! Document ingestion: embed documents and register them as knowledge bases.
//!
//! A document is stored whole ([`Ingestor::ingest`]) or split into
//! fixed-size chunks, one knowledge base per chunk ([`Ingestor::ingest_chunks`]).
//! Chunk metadata is JSON `{"text", "chunk_index", "source"}` so a retrieval
//! service can filter passages by `source`.

use futures::future::try_join_all;
use ragkit_core::validation::require_non_empty;
use ragkit_core::{CollectionId, KnowledgeBaseId, KnowledgeBaseSession, Registry};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::Embedder;
use crate::error::{EmbeddingError, Result};
use crate::summarize::split_chunks;

/// Characters per chunk in [`Ingestor::ingest_chunks`].
pub const DEFAULT_CHUNK_SIZE: usize = 1600;

/// Turns documents into knowledge-base sessions.
pub struct Ingestor {
    registry: Arc<Registry>,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
}

impl Ingestor {
    /// Ingest into `registry` using `embedder`.
    pub fn new(registry: Arc<Registry>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            registry,
            embedder,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Characters per chunk for [`ingest_chunks`](Self::ingest_chunks).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Embed `document` and create knowledge base `id` (generated when
    /// `None`). With `collection`, the new knowledge base joins it.
    ///
    /// Nothing is created when the document is blank, the collection is
    /// unknown, or embedding fails.
    pub async fn ingest(
        &self,
        id: Option<KnowledgeBaseId>,
        document: &str,
        metadata: &str,
        collection: Option<&CollectionId>,
    ) -> Result<KnowledgeBaseSession> {
        require_non_empty("document", document)?;
        self.check_collection(collection)?;

        let embedding = self.embed(document).await?;
        let id = id.unwrap_or_else(KnowledgeBaseId::generate);
        let kb = self.register(id, embedding, document, metadata, collection)?;
        info!("Ingested knowledge base {} ({} dims)", kb.id(), kb.dimension());
        Ok(kb)
    }

    /// Split `document` into chunks and register one knowledge base per
    /// non-blank chunk, in document order. Every chunk is embedded before
    /// anything is created.
    pub async fn ingest_chunks(
        &self,
        document: &str,
        source: &str,
        collection: Option<&CollectionId>,
    ) -> Result<Vec<KnowledgeBaseSession>> {
        require_non_empty("document", document)?;
        require_non_empty("source", source)?;
        self.check_collection(collection)?;

        let chunks: Vec<String> = split_chunks(document, self.chunk_size)
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .collect();
        debug!("Split {} into {} chunks", source, chunks.len());

        let embeddings = try_join_all(chunks.iter().map(|chunk| self.embed(chunk))).await?;

        let mut created = Vec::with_capacity(chunks.len());
        for (index, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
            let metadata = json!({
                "text": chunk,
                "chunk_index": index,
                "source": source,
            });
            let kb = self.register(
                KnowledgeBaseId::generate(),
                embedding,
                chunk,
                &metadata.to_string(),
                collection,
            )?;
            created.push(kb);
        }

        info!("Ingested {} chunks from {}", created.len(), source);
        Ok(created)
    }

    fn check_collection(&self, collection: Option<&CollectionId>) -> Result<()> {
        if let Some(collection_id) = collection {
            self.registry.collection(collection_id)?;
        }
        Ok(())
    }

    /// Embed `text`, holding the backend to the dimension it declares.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embedder.embed(text).await?;
        if let Some(expected) = self.embedder.dimension() {
            if embedding.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                }
                .into());
            }
        }
        Ok(embedding)
    }

    fn register(
        &self,
        id: KnowledgeBaseId,
        embedding: Vec<f32>,
        document: &str,
        metadata: &str,
        collection: Option<&CollectionId>,
    ) -> Result<KnowledgeBaseSession> {
        let kb = self
            .registry
            .create_knowledge_base_session(id, embedding, document, metadata)?;
        let Some(collection_id) = collection else {
            return Ok(kb);
        };

        self.registry.add_session_to_collection(collection_id, kb.id())?;
        debug!("Knowledge base {} joined collection {}", kb.id(), collection_id);
        Ok(self.registry.knowledge_base(kb.id())?)
    }
}
