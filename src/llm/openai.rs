//! OpenAI-compatible chat completions generator.
//!
//! Works against any server exposing `POST /v1/chat/completions` (OpenAI,
//! llama.cpp, vLLM, LM Studio). The model is asked to reply with a JSON
//! object `{text, bubbles, artifact}`; a plain-text reply is accepted too
//! and becomes `text`.

use crate::config::{LlmConfig, SessionSettings};
use crate::conversation::ConversationMessage;
use crate::error::{Result, VoiceError};
use crate::llm::{GeneratedResponse, ResponseGenerator};
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAiCompatibleGenerator {
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGenerator")
            .field("base_url", &self.config.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiCompatibleGenerator {
    /// Create a generator, reading the API key from `config.api_key_env`.
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty())
        };
        Self::with_api_key(config, api_key)
    }

    #[must_use]
    pub fn with_api_key(config: LlmConfig, api_key: Option<String>) -> Self {
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(
        &self,
        history: &[ConversationMessage],
        settings: &SessionSettings,
    ) -> serde_json::Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.config.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": self.config.system_prompt}));
        }
        for message in history {
            messages.push(json!({"role": message.role.as_str(), "content": message.text}));
        }
        json!({
            "model": settings.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
        })
    }
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Interpret assistant content as a structured reply, falling back to plain text.
pub(crate) fn parse_reply(content: &str) -> GeneratedResponse {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim);

    if unfenced.starts_with('{') {
        if let Ok(reply) = serde_json::from_str::<GeneratedResponse>(unfenced) {
            return reply;
        }
    }
    GeneratedResponse::text(trimmed)
}

#[async_trait]
impl ResponseGenerator for OpenAiCompatibleGenerator {
    async fn generate(
        &self,
        history: &[ConversationMessage],
        settings: &SessionSettings,
    ) -> Result<GeneratedResponse> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .json(&self.build_body(history, settings))
            .send()
            .await
            .map_err(|e| VoiceError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Generation(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Generation(format!("invalid response body: {e}")))?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| VoiceError::Generation("response has no message content".to_owned()))?;

        Ok(parse_reply(content))
    }
}
