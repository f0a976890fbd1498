use async_trait::async_trait;
use geoquery_core::{GeoQueryError, LLMConfig, NetworkConfig, Result, RetryPolicy};
use serde::{Deserialize, Serialize};

/// A text-completion backend.
///
/// Providers are interchangeable: the translator only ever asks for one
/// completion per query and parses the returned text itself.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Complete `prompt`, returning the raw model text.
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String>;

    /// Provider identifier, e.g. "anthropic"
    fn provider_name(&self) -> &str;

    /// Model identifier sent to the provider
    fn model_name(&self) -> &str;
}

/// Resolved settings shared by every HTTP provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    /// API base URL without a trailing slash
    pub base_url: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub retry: RetryPolicy,
}

impl ProviderConfig {
    /// Build settings for one provider from the `[llm]` section.
    ///
    /// The key comes from the configuration first, then from `env_var`.
    /// A missing or blank key is a validation error.
    pub fn resolve(
        llm: &LLMConfig,
        network: &NetworkConfig,
        configured_key: Option<&str>,
        env_var: &str,
        default_model: &str,
        default_base_url: &str,
    ) -> Result<Self> {
        let api_key = configured_key
            .map(str::to_string)
            .or_else(|| std::env::var(env_var).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GeoQueryError::validation(format!(
                    "API key for provider '{}' is required. Set {} or add it to the [llm] config section.",
                    llm.provider, env_var
                ))
            })?;

        Ok(Self {
            api_key,
            model: llm
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| default_model.to_string()),
            base_url: llm
                .base_url
                .as_deref()
                .unwrap_or(default_base_url)
                .trim_end_matches('/')
                .to_string(),
            temperature: llm.temperature,
            timeout_secs: llm.timeout_secs,
            retry: RetryPolicy::from_network_config(network),
        })
    }

    pub(crate) fn require_key(&self, provider: &str, env_var: &str) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(GeoQueryError::validation(format!(
                "{} API key is required. Set the {} environment variable.",
                provider, env_var
            )));
        }
        Ok(())
    }
}
