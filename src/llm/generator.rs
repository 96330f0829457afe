//! Core `ResponseGenerator` trait and `ApiGenerator` implementation.
//!
//! `ApiGenerator` calls any OpenAI-compatible `/v1/chat/completions` endpoint
//! — OpenAI, Groq, LM Studio, vLLM, Ollama (OpenAI mode), etc.
//! All connection details come from [`LlmConfig`]; nothing is hardcoded.
//!
//! [`RetryGenerator`] wraps any generator with a bounded retry policy; once
//! the attempts are exhausted the failure escalates to the session loop's
//! apology path.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::prompt;

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

/// Role of a chat message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message in the conversation sent to the model.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenError
// ---------------------------------------------------------------------------

/// Errors that can occur during response generation.
#[derive(Debug, Error)]
pub enum GenError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("generation request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse generation response: {0}")]
    Parse(String),

    /// The model returned a response with no usable text content.
    #[error("model returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for GenError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenError::Timeout
        } else {
            GenError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseGenerator trait
// ---------------------------------------------------------------------------

/// Async trait for dialogue response generation.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn ResponseGenerator>`).
///
/// # Arguments
/// * `history`   – Prior conversation turns, oldest first, without the
///                 system prompt (implementors prepend their own).
/// * `user_text` – The latest transcribed user turn.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Result<String, GenError>;
}

// ---------------------------------------------------------------------------
// ApiGenerator
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// # No hardcoded URLs
/// All connection details (`base_url`, `api_key`, `model`) come exclusively
/// from the [`LlmConfig`] passed to [`ApiGenerator::from_config`].
pub struct ApiGenerator {
    client: reqwest::Client,
    config: LlmConfig,
    system_prompt: String,
}

impl ApiGenerator {
    /// Build an `ApiGenerator` from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A default (no-timeout) client is used as a
    /// last-resort fallback if the builder fails (should never happen in
    /// practice).
    pub fn from_config(config: &LlmConfig, user_name: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            system_prompt: prompt::system_prompt(user_name),
        }
    }
}

#[async_trait]
impl ResponseGenerator for ApiGenerator {
    /// Send the conversation to the configured endpoint.
    ///
    /// The `Authorization: Bearer …` header is attached **only** when
    /// `config.api_key` is `Some(key)` and `key` is non-empty — safe for
    /// local providers that require no authentication.
    async fn generate(
        &self,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Result<String, GenError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.system_prompt,
        })];
        for message in history {
            messages.push(serde_json::json!({
                "role": message.role.as_str(),
                "content": message.content,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": user_text,
        }));

        let body = serde_json::json!({
            "model":       self.config.model,
            "messages":    messages,
            "stream":      false,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens,
        });

        let mut req = self.client.post(&url).json(&body);

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenError::Request(format!("HTTP {status}: {text}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenError::Parse(e.to_string()))?;

        let reply = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(GenError::EmptyResponse)?
            .trim()
            .to_string();

        if reply.is_empty() {
            return Err(GenError::EmptyResponse);
        }

        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// RetryGenerator
// ---------------------------------------------------------------------------

/// Retries a wrapped generator a bounded number of times.
///
/// Every failure kind is retried; an `EmptyResponse` from a flaky provider
/// is as transient as a connection error.  After the final attempt the last
/// error is returned and the session loop speaks the apology prompt.
pub struct RetryGenerator<G> {
    inner: G,
    max_retries: u32,
}

impl<G: ResponseGenerator> RetryGenerator<G> {
    pub fn new(inner: G, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }
}

#[async_trait]
impl<G: ResponseGenerator> ResponseGenerator for RetryGenerator<G> {
    async fn generate(
        &self,
        history: &[ChatMessage],
        user_text: &str,
    ) -> Result<String, GenError> {
        let attempts = self.max_retries + 1;
        let mut last_err = GenError::EmptyResponse;

        for attempt in 1..=attempts {
            match self.inner.generate(history, user_text).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    log::warn!("generation attempt {attempt}/{attempts} failed: {err}");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
