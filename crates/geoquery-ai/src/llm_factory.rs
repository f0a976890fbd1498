use crate::anthropic_provider::{
    AnthropicProvider, ANTHROPIC_API_BASE, ANTHROPIC_DEFAULT_MODEL, ANTHROPIC_ENV_VAR,
};
use crate::gemini_provider::{GeminiProvider, GEMINI_API_BASE, GEMINI_DEFAULT_MODEL, GEMINI_ENV_VAR};
use crate::llm_provider::{LLMProvider, ProviderConfig};
use crate::openai_provider::{OpenAIProvider, OPENAI_API_BASE, OPENAI_DEFAULT_MODEL, OPENAI_ENV_VAR};
use geoquery_core::{GeoQueryConfig, GeoQueryError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Descriptive entry for one supported provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub default_model: &'static str,
    pub env_var: &'static str,
    pub signup_url: &'static str,
    pub models: &'static [&'static str],
}

const PROVIDERS: &[ProviderInfo] = &[
    ProviderInfo {
        id: "anthropic",
        name: "Anthropic Claude",
        default_model: ANTHROPIC_DEFAULT_MODEL,
        env_var: ANTHROPIC_ENV_VAR,
        signup_url: "https://console.anthropic.com/",
        models: &[
            "claude-sonnet-4-5-20250929",
            "claude-opus-4-1-20250805",
            "claude-3-5-haiku-20241022",
        ],
    },
    ProviderInfo {
        id: "openai",
        name: "OpenAI GPT",
        default_model: OPENAI_DEFAULT_MODEL,
        env_var: OPENAI_ENV_VAR,
        signup_url: "https://platform.openai.com/signup",
        models: &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
    },
    ProviderInfo {
        id: "gemini",
        name: "Google Gemini",
        default_model: GEMINI_DEFAULT_MODEL,
        env_var: GEMINI_ENV_VAR,
        signup_url: "https://aistudio.google.com/app/apikey",
        models: &[
            "gemini-2.0-flash",
            "gemini-1.5-flash",
            "gemini-1.5-pro",
        ],
    },
];

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create the provider named by `config.llm.provider`.
    ///
    /// Unknown names and missing API keys fail here, not at first use.
    pub fn create_from_config(config: &GeoQueryConfig) -> Result<Arc<dyn LLMProvider>> {
        let llm = &config.llm;
        let provider_name = llm.provider.trim().to_lowercase();
        let info = Self::provider_info(&provider_name).ok_or_else(|| {
            GeoQueryError::validation(format!(
                "Unsupported LLM provider: {}. Available providers: {}",
                llm.provider,
                Self::supported_providers().join(", ")
            ))
        })?;

        let (configured_key, base_url) = match info.id {
            "anthropic" => (llm.anthropic_api_key.as_deref(), ANTHROPIC_API_BASE),
            "openai" => (llm.openai_api_key.as_deref(), OPENAI_API_BASE),
            _ => (llm.gemini_api_key.as_deref(), GEMINI_API_BASE),
        };
        let provider_config = ProviderConfig::resolve(
            llm,
            &config.network,
            configured_key,
            info.env_var,
            info.default_model,
            base_url,
        )?;

        let provider: Arc<dyn LLMProvider> = match info.id {
            "anthropic" => Arc::new(AnthropicProvider::new(provider_config)?),
            "openai" => Arc::new(OpenAIProvider::new(provider_config)?),
            _ => Arc::new(GeminiProvider::new(provider_config)?),
        };

        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            "LLM provider initialized"
        );
        Ok(provider)
    }

    pub fn supported_providers() -> Vec<&'static str> {
        PROVIDERS.iter().map(|p| p.id).collect()
    }

    pub fn provider_catalog() -> &'static [ProviderInfo] {
        PROVIDERS
    }

    pub fn provider_info(name: &str) -> Option<&'static ProviderInfo> {
        PROVIDERS.iter().find(|p| p.id.eq_ignore_ascii_case(name.trim()))
    }
}
