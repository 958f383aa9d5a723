//! External text-generation collaborator.
//!
//! One request/response text exchange against an OpenAI-compatible chat
//! endpoint. The engine never retries: any [`ProviderError`] routes the call
//! to the deterministic fallback builder, so the worst a misbehaving
//! collaborator can do is cost one timeout.

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Text-in/text-out seam for plan generation. Implementations must be
/// cancellable/time-boxed; the default chat provider carries a hard client
/// timeout.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Chat-completions bridge to the configured endpoint.
pub struct ChatCompletionProvider {
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ChatCompletionProvider {
    /// Build from configuration. Returns `NotConfigured` when no endpoint is
    /// set, so callers can decide between failing fast and running
    /// fallback-only.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_url = config
            .api_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ProviderError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            api_url,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl PlanGenerator for ChatCompletionProvider {
    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        debug!("Provider returned {} chars", content.len());
        Ok(content)
    }
}
