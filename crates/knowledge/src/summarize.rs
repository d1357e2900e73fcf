//! Document summarization.
//!
//! Two modes: a single "stuff" request for short texts, and map-reduce for
//! long ones. Map-reduce splits the text into fixed-size chunks, summarizes
//! them concurrently, then collapses the summaries in token-bounded batches
//! until they fit the budget, and finishes with one reduce.

use futures::future::try_join_all;
use ragkit_core::ModelError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{Completer, CompletionOptions};
use crate::error::Result;
use crate::prompt::{PromptTemplate, MAP_PROMPT, REDUCE_PROMPT, SUMMARY_PROMPT};

/// Collapse rounds before giving up and reducing whatever is left.
const MAX_COLLAPSE_ROUNDS: usize = 8;

/// Summarizer tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerSettings {
    /// Characters per chunk
    pub chunk_size: usize,
    /// Token budget for the collapse phase
    pub token_max: usize,
    /// Temperature for every call
    pub temperature: f64,
    /// Token limit per call
    pub max_tokens: u32,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            token_max: 1000,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// Result of [`Summarizer::summarize_chunked`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedSummary {
    /// One summary per chunk, in chunk order
    pub individual_summaries: Vec<String>,
    /// The combined summary
    pub final_summary: String,
    /// Length of the input in characters
    pub original_length: usize,
}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Split `text` into pieces of at most `chunk_size` characters.
pub fn split_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Group `docs` in order so each group's estimated tokens stay within
/// `token_max`. A single oversized doc forms its own group.
pub fn split_by_tokens(docs: &[String], token_max: usize) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0;

    for doc in docs {
        let tokens = estimate_tokens(doc);
        if !current.is_empty() && current_tokens + tokens > token_max {
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current.push(doc.clone());
        current_tokens += tokens;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn total_tokens(docs: &[String]) -> usize {
    docs.iter().map(|d| estimate_tokens(d)).sum()
}

/// Summarizes text through a [`Completer`].
pub struct Summarizer {
    completer: Arc<dyn Completer>,
    settings: SummarizerSettings,
}

impl Summarizer {
    /// Summarizer with default settings.
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self::with_settings(completer, SummarizerSettings::default())
    }

    /// Summarizer with explicit settings.
    pub fn with_settings(completer: Arc<dyn Completer>, settings: SummarizerSettings) -> Self {
        Self { completer, settings }
    }

    /// Settings in use.
    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    /// Summarize `text` in one request.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        require_text(text)?;
        let prompt = PromptTemplate::new("summary", SUMMARY_PROMPT).render_one("context", text)?;
        Ok(self.completer.complete(&prompt, &self.options()).await?)
    }

    /// Map-reduce summary of `text`.
    pub async fn summarize_chunked(&self, text: &str) -> Result<ChunkedSummary> {
        require_text(text)?;
        let chunks = split_chunks(text, self.settings.chunk_size);
        info!("Summarizing {} chunks ({} chars)", chunks.len(), text.chars().count());

        let individual_summaries = try_join_all(chunks.iter().map(|c| self.map_one(c))).await?;

        let mut docs = individual_summaries.clone();
        let mut rounds = 0;
        while docs.len() > 1 && total_tokens(&docs) > self.settings.token_max {
            if rounds == MAX_COLLAPSE_ROUNDS {
                warn!("Summaries still over budget after {} collapse rounds", rounds);
                break;
            }
            let batches = split_by_tokens(&docs, self.settings.token_max);
            debug!("Collapsing {} summaries into {} batches", docs.len(), batches.len());
            docs = try_join_all(batches.iter().map(|b| self.reduce(b))).await?;
            rounds += 1;
        }

        let final_summary = self.reduce(&docs).await?;
        Ok(ChunkedSummary {
            individual_summaries,
            final_summary,
            original_length: text.chars().count(),
        })
    }

    async fn map_one(&self, chunk: &str) -> Result<String> {
        let prompt = PromptTemplate::new("map", MAP_PROMPT).render_one("context", chunk)?;
        Ok(self.completer.complete(&prompt, &self.options()).await?)
    }

    async fn reduce(&self, docs: &[String]) -> Result<String> {
        let prompt =
            PromptTemplate::new("reduce", REDUCE_PROMPT).render_one("docs", docs.join("\n\n"))?;
        Ok(self.completer.complete(&prompt, &self.options()).await?)
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            system_prompt: None,
        }
    }
}

fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ModelError::Validation {
            field: "text",
            reason: "must not be empty".to_string(),
        }
        .into());
    }
    Ok(())
}
