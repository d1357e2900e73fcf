//! Grounded chat over a message session.
//!
//! Each turn appends the human message, retrieves context, asks the
//! completion backend and appends the reply. Messages already appended stay
//! in the log if a later step fails.

use futures::stream::BoxStream;
use futures::StreamExt;
use ragkit_core::{ChatMessage, KnowledgeBaseSession, Registry, Role, SessionId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{Completer, CompletionOptions, Retriever, DEFAULT_K};
use crate::error::{KnowledgeError, Result};
use crate::prompt::{rag_prompt, RAG_SYSTEM_PROMPT};

/// Stream of reply fragments from [`ChatService::ask_stream`].
pub type ReplyStream = BoxStream<'static, Result<String>>;

/// Retrieval-augmented chat.
pub struct ChatService {
    registry: Arc<Registry>,
    retriever: Arc<dyn Retriever>,
    completer: Arc<dyn Completer>,
    k: usize,
    source: Option<String>,
    options: CompletionOptions,
}

impl ChatService {
    /// Chat over `registry` sessions with the given collaborators.
    pub fn new(
        registry: Arc<Registry>,
        retriever: Arc<dyn Retriever>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            registry,
            retriever,
            completer,
            k: DEFAULT_K,
            source: None,
            options: CompletionOptions::default().with_system_prompt(RAG_SYSTEM_PROMPT),
        }
    }

    /// Passages retrieved per turn.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Retrieve only passages ingested from `source`.
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    /// Completion options; the RAG system prompt is kept unless one is set.
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = CompletionOptions {
            system_prompt: options.system_prompt.or_else(|| Some(RAG_SYSTEM_PROMPT.to_string())),
            ..options
        };
        self
    }

    /// Answer `message` in session `session_id` and return the stored reply.
    pub async fn ask(&self, session_id: &SessionId, message: &str) -> Result<ChatMessage> {
        let prompt = self.prepare(session_id, message).await?;
        let reply = self.completer.complete(&prompt, &self.options).await?;
        let stored = self.registry.append_chat_message(session_id, reply, Role::Assistant)?;
        info!("Answered in session {} ({} chars)", session_id, stored.content().len());
        Ok(stored)
    }

    /// Like [`ask`](Self::ask) but yields the reply as it is generated. The
    /// full reply is appended once the stream ends without error.
    pub async fn ask_stream(&self, session_id: &SessionId, message: &str) -> Result<ReplyStream> {
        let prompt = self.prepare(session_id, message).await?;
        let mut chunks = self.completer.complete_stream(&prompt, &self.options).await?;
        let registry = self.registry.clone();
        let session_id = session_id.clone();

        let stream = async_stream::try_stream! {
            let mut reply = String::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(KnowledgeError::Completion)?;
                reply.push_str(&chunk);
                yield chunk;
            }
            registry
                .append_chat_message(&session_id, reply, Role::Assistant)
                .map_err(KnowledgeError::Model)?;
            info!("Streamed answer stored in session {}", session_id);
        };

        Ok(Box::pin(stream))
    }

    /// Append the human turn and build the grounded prompt.
    async fn prepare(&self, session_id: &SessionId, message: &str) -> Result<String> {
        self.registry.append_chat_message(session_id, message, Role::Human)?;
        let session = self.registry.message_session(session_id)?;

        let mut passages = Vec::new();
        if let Some(kb) = session.knowledge_base() {
            passages.push((source_label(kb), kb.document().to_string()));
        }

        let retrieved = self
            .retriever
            .search(message, self.k, self.source.as_deref())
            .await?;
        debug!("Retrieved {} passages for session {}", retrieved.len(), session_id);
        passages.extend(
            retrieved
                .into_iter()
                .enumerate()
                .map(|(i, text)| (format!("retrieval #{}", i + 1), text)),
        );

        rag_prompt(&passages, message)
    }
}

/// `source` from the knowledge base's JSON metadata, else its id.
fn source_label(kb: &KnowledgeBaseSession) -> String {
    kb.metadata_json()
        .and_then(|m| m.get("source").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or_else(|| kb.id().to_string())
}
