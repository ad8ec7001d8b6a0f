//! Language-model collaborator client with streamed completions.
//!
//! Query generation and report composition both consume the model's
//! response incrementally rather than waiting for the full text, so this
//! client exposes a stream of text fragments instead of a single `String`.
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::util::retry::RetryConfig;

pub(crate) type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
pub(crate) trait LlmClient: Send + Sync {
    /// Stream a completion for `prompt` under `system`. Each item is a text
    /// fragment as it arrives from the model; the stream ends when the
    /// model signals completion.
    async fn stream_completion(&self, system: &str, prompt: &str) -> Result<CompletionStream>;
}

pub(crate) struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl HttpLlmClient {
    #[must_use]
    pub(crate) fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            timeout,
            retry,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn stream_completion(&self, system: &str, prompt: &str) -> Result<CompletionStream> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: true,
        };

        let mut attempt = 0usize;
        let response = loop {
            let call = self
                .http
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send();

            let result = tokio::time::timeout(self.timeout, call).await;

            match result {
                Ok(Ok(response)) => match response.error_for_status() {
                    Ok(response) => break response,
                    Err(err) if self.retry.can_retry(attempt) && is_retryable_status(&err) => {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        return Err(anyhow!(err)).context("language model returned an error status")
                    }
                },
                Ok(Err(err)) if self.retry.can_retry(attempt) => {
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    let _ = err;
                }
                Ok(Err(err)) => return Err(err).context("language model request failed"),
                Err(elapsed) if self.retry.can_retry(attempt) => {
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                    let _ = elapsed;
                }
                Err(elapsed) => return Err(elapsed.into()).context("language model request timed out"),
            }
        };

        let byte_stream = response.bytes_stream();
        let fragments = byte_stream
            .map(|chunk| chunk.map_err(|err| anyhow!(err)))
            .flat_map(|chunk| futures::stream::iter(split_sse_events(chunk)));

        Ok(Box::pin(fragments))
    }
}

fn is_retryable_status(err: &reqwest::Error) -> bool {
    err.status()
        .is_some_and(|status| status.as_u16() == 429 || status.is_server_error())
}

/// Split one raw byte chunk into the text fragments of its `data:` lines,
/// ignoring the terminal `[DONE]` marker and any line that fails to parse.
fn split_sse_events(chunk: Result<bytes::Bytes>) -> Vec<Result<String>> {
    let chunk = match chunk {
        Ok(chunk) => chunk,
        Err(err) => return vec![Err(err)],
    };

    let text = String::from_utf8_lossy(&chunk);
    let mut fragments = Vec::new();

    for line in text.lines() {
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if payload == "[DONE]" {
            continue;
        }
        match serde_json::from_str::<ChatChunk>(payload) {
            Ok(parsed) => {
                if let Some(content) = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                {
                    if !content.is_empty() {
                        fragments.push(Ok(content));
                    }
                }
            }
            Err(_) => continue,
        }
    }

    fragments
}

/// Join a stream of fragments into a full text, accumulating until the
/// stream ends. Used where a stage needs the complete response rather than
/// incremental events (e.g. to build a prompt from a prior pass's output).
pub(crate) async fn collect(mut stream: CompletionStream) -> Result<String> {
    let mut out = String::new();
    while let Some(fragment) = stream.next().await {
        out.push_str(&fragment?);
    }
    Ok(out)
}
