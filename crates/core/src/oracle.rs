//! Text-generation oracle.
//!
//! Every explanation, decomposition, question and grade comes from a single
//! narrow capability: prompt in, text out. Implementations never fail; on error
//! they return diagnostic text which callers embed wherever the answer was
//! meant to go.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// A single generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// The generative text capability behind the tutor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns generated text, or diagnostic text starting with `Error:`.
    async fn generate(&self, request: OracleRequest) -> String;
}

/// Prefix of the text an oracle returns instead of an answer.
pub const DIAGNOSTIC_PREFIX: &str = "Error:";

/// Formats a failure the way every oracle reports it.
pub fn diagnostic(reason: impl std::fmt::Display) -> String {
    format!("{DIAGNOSTIC_PREFIX} {reason}")
}

pub fn is_diagnostic(text: &str) -> bool {
    text.starts_with(DIAGNOSTIC_PREFIX)
}

/// An `Oracle` for any OpenAI-compatible chat completion API.
///
/// Each call is bounded by `timeout` and retried once before falling back to
/// diagnostic text.
pub struct OpenAICompatibleOracle {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAICompatibleOracle {
    /// Creates a new oracle.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the provider.
    /// * `model` - Chat model identifier (e.g., "gpt-4.1-nano").
    /// * `timeout` - Upper bound for a single completion call.
    pub fn new(config: OpenAIConfig, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            timeout,
        }
    }

    async fn complete(&self, request: &OracleRequest) -> anyhow::Result<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        if let Some(system_prompt) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.as_str())
                .build()?
                .into(),
        );

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
            .await
            .map_err(|_| anyhow::anyhow!("request timed out after {:?}", self.timeout))??;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| anyhow::anyhow!("no content in completion response"))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Oracle for OpenAICompatibleOracle {
    async fn generate(&self, request: OracleRequest) -> String {
        match self.complete(&request).await {
            Ok(text) => text,
            Err(first) => {
                debug!(error = %first, "Oracle call failed, retrying once");
                match self.complete(&request).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, model = %self.model, "Oracle call failed twice");
                        diagnostic(e)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_fields() {
        let request = OracleRequest::new("hi")
            .with_system_prompt("be kind")
            .with_temperature(0.3)
            .with_max_tokens(64);
        assert_eq!(request.prompt, "hi");
        assert_eq!(request.system_prompt.as_deref(), Some("be kind"));
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_tokens, 64);
    }

    #[test]
    fn request_defaults() {
        let request = OracleRequest::new("x");
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(request.system_prompt.is_none());
    }

    #[test]
    fn diagnostic_prefix() {
        assert_eq!(diagnostic("timeout"), "Error: timeout");
        assert!(is_diagnostic(&diagnostic("timeout")));
        assert!(!is_diagnostic("Light is energy."));
    }

    #[tokio::test]
    async fn unreachable_provider_degrades_to_diagnostic_text() {
        let config = OpenAIConfig::new()
            .with_api_key("test-key")
            .with_api_base("http://127.0.0.1:9/v1");
        let oracle =
            OpenAICompatibleOracle::new(config, "test-model".into(), Duration::from_millis(500));
        let text = oracle.generate(OracleRequest::new("hello")).await;
        assert!(text.starts_with("Error:"), "got {text}");
    }
}
