//! OpenAI-compatible chat completion client.
//!
//! Speaks `/chat/completions` as served by Groq, vLLM/RunPod and OpenAI.
//! Streaming responses are Server-Sent Events: `data: {json}` events
//! terminated by `data: [DONE]`.

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::backend::{ChunkStream, Completer, CompletionOptions};
use crate::error::{status_and_body, CompletionError};

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client for OpenAI-compatible servers.
#[derive(Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompletionClient {
    /// Create a client for `base_url` (e.g. `https://api.groq.com/openai/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    /// Model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn payload(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, CompletionError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(CompletionError::Status { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl Completer for OpenAiCompletionClient {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        debug!("Requesting completion from {} ({} chars)", self.model, prompt.len());
        let response = self.send(&self.payload(prompt, options, false)).await?;

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        let choice = data.choices.into_iter().next().ok_or(CompletionError::Empty)?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<ChunkStream, CompletionError> {
        debug!("Requesting streamed completion from {}", self.model);
        let response = self.send(&self.payload(prompt, options, true)).await?;
        // A trailing blank line dispatches a final event the server left unterminated.
        let mut events = response
            .bytes_stream()
            .map_ok(|bytes| bytes.to_vec())
            .chain(futures::stream::once(async { Ok::<_, reqwest::Error>(b"\n\n".to_vec()) }))
            .eventsource()
            .boxed();

        let stream = async_stream::try_stream! {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| match e {
                    EventStreamError::Transport(e) => CompletionError::Http(e),
                    other => CompletionError::Malformed(other.to_string()),
                })?;

                match parse_event_data(&event.data)? {
                    SseData::Done => break,
                    SseData::Content(text) => yield text,
                    SseData::Skip => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, PartialEq)]
enum SseData {
    Content(String),
    Done,
    Skip,
}

fn parse_event_data(data: &str) -> Result<SseData, CompletionError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseData::Skip);
    }
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| CompletionError::Malformed(e.to_string()))?;
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => Ok(SseData::Content(text)),
        _ => Ok(SseData::Skip),
    }
}
