use crate::http::{build_client, decode, post_json};
use crate::llm_provider::{LLMProvider, ProviderConfig};
use async_trait::async_trait;
use geoquery_core::{GeoQueryError, Result, RetryLayer};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const OPENAI_ENV_VAR: &str = "OPENAI_API_KEY";

/// OpenAI provider (Chat Completions API). Also works against any
/// OpenAI-compatible endpoint through `base_url`.
pub struct OpenAIProvider {
    config: ProviderConfig,
    client: Client,
    retry: RetryLayer,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.require_key("OpenAI", OPENAI_ENV_VAR)?;
        let client = build_client(config.timeout_secs)?;
        let retry = RetryLayer::new(config.retry.clone());
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn build_request(&self, prompt: &str, max_tokens: usize) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: self.config.temperature,
        }
    }
}

pub(crate) fn extract_text(body: &str) -> Result<String> {
    let response: ChatCompletionResponse = decode("OpenAI", body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| GeoQueryError::translation("OpenAI API returned no choices"))
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let start = Instant::now();
        let request = self.build_request(prompt, max_tokens);
        let url = format!("{}/chat/completions", self.config.base_url);
        let auth = format!("Bearer {}", self.config.api_key);

        let body = post_json(
            &self.client,
            &self.retry,
            "OpenAI",
            &url,
            &[("Authorization", auth.as_str())],
            &request,
        )
        .await?;

        let text = extract_text(&body)?;
        debug!(
            provider = "openai",
            model = %self.config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Completion received"
        );
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

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
    #[serde(default)]
    content: Option<String>,
}
