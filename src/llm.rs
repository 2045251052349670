//! Chat-completion client with exponential backoff retry logic.
//!
//! This module talks to an OpenAI-compatible `/chat/completions` endpoint.
//! It includes automatic retry logic with exponential backoff and jitter to
//! handle transient failures gracefully.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`OpenAiClient`]: Plain or streamed completions over `reqwest`
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - Bounded retry attempts (3 by default), only for transient errors
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//!
//! # Streaming
//!
//! With streaming enabled the reply arrives as server-sent events. The deltas
//! are accumulated into one buffer; nothing downstream sees partial text.

use crate::config::LlmSettings;
use crate::error::GenerationError;
use crate::prompt::Prompt;
use crate::utils::truncate_for_log;
use futures::StreamExt;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send a prompt to an LLM and receive a
/// response. This abstraction allows for different LLM backends or
/// decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send a prompt to the LLM and receive a response.
    fn ask(
        &self,
        prompt: &Prompt,
    ) -> impl Future<Output = Result<Self::Response, GenerationError>> + Send;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// Only errors for which [`GenerationError::is_transient`] holds are retried;
/// anything else is returned immediately.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..max_jitter)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
    /// Upper bound of the random jitter added to each delay.
    max_jitter: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying LLM client to wrap
    /// * `max_retries` - Maximum number of retry attempts
    /// * `base_delay` - Initial delay between retries
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(250),
        }
    }

    #[cfg(test)]
    fn with_max_jitter(mut self, max_jitter: StdDuration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=self.max_jitter.as_millis() as u64);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + Sync,
    T::Response: Send,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &Prompt) -> Result<Self::Response, GenerationError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(prompt).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() {
                        error!(
                            attempt,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() failed with a permanent error"
                        );
                        return Err(e);
                    }

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// One decoded server-sent event from a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental decoder for `data:` lines of a server-sent event stream.
///
/// Network chunks may split lines (and UTF-8 sequences) anywhere, so bytes
/// are held back until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed one network chunk and return the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            match data.trim() {
                "" => {}
                "[DONE]" => events.push(SseEvent::Done),
                payload => events.push(SseEvent::Data(payload.to_string())),
            }
        }
        events
    }
}

/// Client for an OpenAI-compatible chat-completion endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    stream: bool,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .finish()
    }
}

impl OpenAiClient {
    /// Build a client with the request timeout from `settings`.
    pub fn new(settings: &LlmSettings, api_key: &str) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: chat_endpoint(&settings.base_url),
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            stream: settings.stream,
        })
    }

    fn request(&self, prompt: &Prompt, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            stream,
        };
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
    }

    async fn send(
        &self,
        prompt: &Prompt,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let resp = self.request(prompt, stream).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            });
        }
        Ok(resp)
    }

    /// Single-shot completion.
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let resp = self.send(prompt, false).await?;
        let text = resp.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        non_empty(content)
    }

    /// Streamed completion, accumulated into one string.
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn complete_streaming(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let resp = self.send(prompt, true).await?;
        let mut stream = resp.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut full = String::new();
        let mut chunks = 0usize;

        'events: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| GenerationError::Stream(e.to_string()))?;
            for event in decoder.feed(&bytes) {
                let payload = match event {
                    SseEvent::Done => break 'events,
                    SseEvent::Data(payload) => payload,
                };
                let chunk: ChatChunk = serde_json::from_str(&payload)?;
                for choice in chunk.choices {
                    if let Some(delta) = choice.delta.content {
                        full.push_str(&delta);
                    }
                }
                chunks += 1;
                debug!(chunk_number = chunks, "Received completion chunk");
            }
        }

        info!(chunks, bytes = full.len(), "Completion stream finished");
        non_empty(full)
    }
}

impl AskAsync for OpenAiClient {
    type Response = String;

    async fn ask(&self, prompt: &Prompt) -> Result<Self::Response, GenerationError> {
        let t0 = Instant::now();
        let res = if self.stream {
            self.complete_streaming(prompt).await
        } else {
            self.complete(prompt).await
        };
        let dt = t0.elapsed();

        match &res {
            Ok(reply) => debug!(
                elapsed_ms = dt.as_millis() as u64,
                bytes = reply.len(),
                "API call succeeded"
            ),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "API call failed"),
        }
        res
    }
}

/// High-level function to call the LLM, logging the total time spent.
///
/// `api` is normally a [`RetryAsk`], so the time includes any backoff.
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff<A>(api: &A, prompt: &Prompt) -> Result<String, GenerationError>
where
    A: AskAsync<Response = String>,
{
    let t0 = Instant::now();
    let res = api.ask(prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(
            elapsed_ms_total = dt.as_millis() as u64,
            "ask_with_backoff succeeded"
        ),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis() as u64, error = %e, "ask_with_backoff failed")
        }
    }
    res
}

/// Resolve the chat completions endpoint from a base URL.
fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

fn non_empty(content: String) -> Result<String, GenerationError> {
    if content.trim().is_empty() {
        Err(GenerationError::Empty)
    } else {
        Ok(content)
    }
}
