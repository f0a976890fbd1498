use crate::http::{build_client, decode, post_json};
use crate::llm_provider::{LLMProvider, ProviderConfig};
use async_trait::async_trait;
use geoquery_core::{GeoQueryError, Result, RetryLayer};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const ANTHROPIC_ENV_VAR: &str = "ANTHROPIC_API_KEY";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider (Messages API)
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: Client,
    retry: RetryLayer,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.require_key("Anthropic", ANTHROPIC_ENV_VAR)?;
        let client = build_client(config.timeout_secs)?;
        let retry = RetryLayer::new(config.retry.clone());
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn build_request(&self, prompt: &str, max_tokens: usize) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: Some(self.config.temperature),
        }
    }
}

/// Concatenate the text blocks of a Messages API response.
pub(crate) fn extract_text(body: &str) -> Result<String> {
    let response: AnthropicResponse = decode("Anthropic", body)?;
    let text = response
        .content
        .iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(GeoQueryError::translation(
            "Anthropic API returned no text content",
        ));
    }
    Ok(text)
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let start = Instant::now();
        let request = self.build_request(prompt, max_tokens);
        let url = format!("{}/messages", self.config.base_url);

        let body = post_json(
            &self.client,
            &self.retry,
            "Anthropic",
            &url,
            &[
                ("x-api-key", self.config.api_key.as_str()),
                ("anthropic-version", API_VERSION),
            ],
            &request,
        )
        .await?;

        let text = extract_text(&body)?;
        debug!(
            provider = "anthropic",
            model = %self.config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Completion received"
        );
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Anthropic API request/response types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}
