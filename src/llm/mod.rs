//! LLM completion backend.
//!
//! One non-streaming chat completion per call against an OpenAI-compatible
//! endpoint. The responder is the only caller; it maps every error from
//! here to a canned fallback reply, so failures must be catchable, never
//! panics.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::LlmError;

/// Default completion endpoint.
const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/chat/completions";
/// Default completion model.
const DEEPSEEK_MODEL: &str = "deepseek-chat";

/// A bounded, non-streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instruction.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Output length cap in tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Text-generation backend seam.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one completion and return the raw text.
    async fn generate(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// DeepSeek chat-completions client.
pub struct DeepSeekClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: SecretString,
}

impl DeepSeekClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: DEEPSEEK_API_URL.to_string(),
            model: DEEPSEEK_MODEL.to_string(),
            api_key,
        }
    }

    /// Override the completion endpoint (tests point this at a stub).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Use a different model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl TextGenerator for DeepSeekClient {
    async fn generate(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        });

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "deepseek".to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "deepseek".to_string(),
                reason: format!("HTTP {status}: {body_text}"),
            });
        }

        let completion: ChatCompletionResponse =
            resp.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: "deepseek".to_string(),
                reason: e.to_string(),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: "deepseek".to_string(),
                reason: "no choices in response".to_string(),
            })
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}
