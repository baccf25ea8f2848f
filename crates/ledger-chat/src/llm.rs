//! Remote text-completion client.
//!
//! [`LlmClient`] is the seam the classifier and synthesizer call through.
//! [`OpenAiClient`] talks to an OpenAI-compatible chat completions endpoint;
//! [`MockLlm`] replays scripted replies for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ledger_core::config::LlmConfig;

use crate::error::ChatError;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    /// `None` leaves the provider's default sampling in place.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Trait for completion backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Return the trimmed completion text for `request`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError>;
}

// =============================================================================
// OpenAI-compatible client
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Fatal(String),
}

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Build a client whose credential comes from the environment variable
    /// named by `config.api_key_env`.
    pub fn from_env(config: &LlmConfig) -> Result<Self, ChatError> {
        let key = std::env::var(&config.api_key_env).map_err(|_| {
            ChatError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, AttemptError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AttemptError::Retryable(e.to_string())
                } else {
                    AttemptError::Fatal(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let msg = format!("HTTP {}: {}", status.as_u16(), truncate(&detail, 200));
            return Err(if is_retryable_status(status) {
                AttemptError::Retryable(msg)
            } else {
                AttemptError::Fatal(msg)
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(format!("malformed completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AttemptError::Fatal("empty completion".to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        let mut attempt = 0u32;
        loop {
            match self.attempt(request).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "Completion received");
                    return Ok(text);
                }
                Err(AttemptError::Retryable(msg)) if attempt < self.max_retries => {
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Retryable(msg)) | Err(AttemptError::Fatal(msg)) => {
                    return Err(ChatError::Llm(msg));
                }
            }
        }
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================================================================
// MockLlm
// =============================================================================

/// Scripted client that replays queued replies in order.
///
/// An `Err` entry simulates a remote failure. Running out of replies is
/// also a failure.
#[derive(Debug, Default)]
pub struct MockLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .replies
            .lock()
            .map_err(|e| ChatError::Llm(format!("mock lock poisoned: {}", e)))?
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(text.trim().to_string()),
            Some(Err(msg)) => Err(ChatError::Llm(msg)),
            None => Err(ChatError::Llm("no scripted reply left".to_string())),
        }
    }
}
