use crate::http::{build_client, decode, post_json};
use crate::llm_provider::{LLMProvider, ProviderConfig};
use async_trait::async_trait;
use geoquery_core::{GeoQueryError, Result, RetryLayer};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const GEMINI_ENV_VAR: &str = "GEMINI_API_KEY";

/// Google Gemini provider (generateContent API)
pub struct GeminiProvider {
    config: ProviderConfig,
    client: Client,
    retry: RetryLayer,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.require_key("Gemini", GEMINI_ENV_VAR)?;
        let client = build_client(config.timeout_secs)?;
        let retry = RetryLayer::new(config.retry.clone());
        Ok(Self {
            config,
            client,
            retry,
        })
    }

    fn build_request(&self, prompt: &str, max_tokens: usize) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
                temperature: self.config.temperature,
            },
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }
}

pub(crate) fn extract_text(body: &str) -> Result<String> {
    let response: GenerateContentResponse = decode("Gemini", body)?;
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GeoQueryError::translation(
            "Gemini API returned no candidate text",
        ));
    }
    Ok(text)
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let start = Instant::now();
        let request = self.build_request(prompt, max_tokens);
        let url = self.endpoint();

        let body = post_json(
            &self.client,
            &self.retry,
            "Gemini",
            &url,
            &[("x-goog-api-key", self.config.api_key.as_str())],
            &request,
        )
        .await?;

        let text = extract_text(&body)?;
        debug!(
            provider = "gemini",
            model = %self.config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Completion received"
        );
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}
