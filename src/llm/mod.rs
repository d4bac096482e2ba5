use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::AnthropicSettings;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Defines the shape of a single-turn completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageRole {
    User,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
}

/// Text completion seam used by the review module.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: ANTHROPIC_MESSAGES_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_settings(http: Client, settings: &AnthropicSettings) -> Option<Self> {
        settings
            .api_key
            .as_ref()
            .map(|key| Self::new(http, key.clone()))
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let payload = build_payload(&request);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("failed to read response body")?;
        let body: serde_json::Value = serde_json::from_str(&response_text).with_context(|| {
            format!(
                "failed to parse Anthropic response as JSON. Response body: {}",
                crate::backend::preview(&response_text, 500)
            )
        })?;
        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            bail!("anthropic call failed with status {}: {}", status, message);
        }

        let parsed: MessagesPayload = serde_json::from_value(body.clone())
            .map_err(|_| anyhow!("unexpected Anthropic response payload: {}", body))?;
        let text = parsed
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| anyhow!("Anthropic response contained no text block"))?;

        let token_usage = parsed
            .usage
            .map(|usage| TokenUsage {
                prompt_tokens: usage.input_tokens,
                response_tokens: usage.output_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse { text, token_usage })
    }
}

fn build_payload(request: &LlmRequest) -> serde_json::Value {
    let messages = request
        .messages
        .iter()
        .map(|msg| {
            serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.text,
            })
        })
        .collect::<Vec<_>>();

    serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": messages,
    })
}

#[derive(Debug, Deserialize)]
struct MessagesPayload {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}
