//! LLM suggestion channel.
//!
//! Supports two API formats:
//! - **Anthropic** (default): Claude API with `x-api-key` auth
//! - **OpenAI-compatible**: Works with OpenAI, Ollama, vLLM, LiteLLM, etc.
//!
//! Set `SCHEMALIFT_LLM_PROVIDER=openai` to switch to OpenAI-compatible mode.
//!
//! The channel is opaque and non-deterministic; everything downstream treats
//! its output as best-effort text and parses defensively.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("LLM returned empty response")]
    EmptyResponse,
}

/// Text and vision completions against an opaque language model.
///
/// The analyzers depend only on this trait; tests substitute scripted fakes.
#[async_trait]
pub trait SuggestionChannel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;

    /// Vision completion with one attached image (`media_type` is a MIME
    /// type such as `image/png`).
    async fn complete_with_image(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image_data: &[u8],
        media_type: &str,
    ) -> Result<String, LlmError>;
}

/// Supported API providers
#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    Anthropic,
    OpenAI,
}

/// LLM configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
    pub provider: LlmProvider,
}

impl LlmConfig {
    /// Load config from environment. Returns None if no API key is set.
    ///
    /// Checks `SCHEMALIFT_LLM_PROVIDER` to determine the provider:
    /// - `"openai"` → OpenAI-compatible mode (checks `OPENAI_API_KEY` then `ANTHROPIC_API_KEY`)
    /// - `"anthropic"` or unset → Anthropic mode (checks `ANTHROPIC_API_KEY`)
    pub fn from_env() -> Option<Self> {
        let provider_str = std::env::var("SCHEMALIFT_LLM_PROVIDER")
            .unwrap_or_default()
            .to_lowercase();

        let (provider, api_key, default_model, default_url) = match provider_str.as_str() {
            "openai" => {
                let key = std::env::var("OPENAI_API_KEY")
                    .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
                    .ok()?;
                (
                    LlmProvider::OpenAI,
                    key,
                    "gpt-4o".to_string(),
                    "https://api.openai.com/v1/chat/completions".to_string(),
                )
            }
            _ => {
                let key = std::env::var("ANTHROPIC_API_KEY").ok()?;
                (
                    LlmProvider::Anthropic,
                    key,
                    "claude-sonnet-4-20250514".to_string(),
                    "https://api.anthropic.com/v1/messages".to_string(),
                )
            }
        };

        if api_key.is_empty() {
            return None;
        }

        Some(Self {
            api_key,
            model: std::env::var("SCHEMALIFT_LLM_MODEL").unwrap_or(default_model),
            api_url: std::env::var("SCHEMALIFT_LLM_API_URL").unwrap_or(default_url),
            max_tokens: std::env::var("SCHEMALIFT_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8192),
            provider,
        })
    }
}

// ── Anthropic API types ──

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

// ── OpenAI-compatible API types ──

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

/// HTTP-backed implementation of [`SuggestionChannel`].
pub struct HttpSuggestionChannel {
    client: Client,
    config: LlmConfig,
}

impl HttpSuggestionChannel {
    pub fn new(config: LlmConfig) -> Self {
        HttpSuggestionChannel {
            client: Client::new(),
            config,
        }
    }

    /// Build a channel from the environment, or None without an API key.
    pub fn from_env() -> Option<Self> {
        LlmConfig::from_env().map(Self::new)
    }

    async fn call_anthropic(
        &self,
        system_prompt: &str,
        user_content: serde_json::Value,
    ) -> Result<String, LlmError> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: system_prompt.to_string(),
            messages: vec![serde_json::json!({
                "role": "user",
                "content": user_content,
            })],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let msg: AnthropicResponse = response.json().await?;
        let text = msg
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    async fn call_openai(
        &self,
        system_prompt: &str,
        user_content: serde_json::Value,
    ) -> Result<String, LlmError> {
        let request = OpenAIRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![
                serde_json::json!({"role": "system", "content": system_prompt}),
                serde_json::json!({"role": "user", "content": user_content}),
            ],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let msg: OpenAIResponse = response.json().await?;
        let text = msg
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl SuggestionChannel for HttpSuggestionChannel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let content = serde_json::Value::String(user_prompt.to_string());
        match self.config.provider {
            LlmProvider::Anthropic => self.call_anthropic(system_prompt, content).await,
            LlmProvider::OpenAI => self.call_openai(system_prompt, content).await,
        }
    }

    async fn complete_with_image(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image_data: &[u8],
        media_type: &str,
    ) -> Result<String, LlmError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_data);
        match self.config.provider {
            LlmProvider::Anthropic => {
                let content = serde_json::json!([
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": encoded,
                        },
                    },
                    {"type": "text", "text": user_prompt},
                ]);
                self.call_anthropic(system_prompt, content).await
            }
            LlmProvider::OpenAI => {
                let content = serde_json::json!([
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:{media_type};base64,{encoded}")},
                    },
                    {"type": "text", "text": user_prompt},
                ]);
                self.call_openai(system_prompt, content).await
            }
        }
    }
}
