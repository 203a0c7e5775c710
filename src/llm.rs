use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

/// Text generation backend used by the router's default rule.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_text: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_text: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage::new("system", system_prompt),
                ChatMessage::new("user", user_text),
            ],
            max_tokens: max_output_tokens,
            temperature,
        };

        let url = format!("{}/chat/completions", self.config.effective_base_url());

        debug!("Sending completion request to {} ({})", url, self.config.provider);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("No content in completion response")
    }
}
