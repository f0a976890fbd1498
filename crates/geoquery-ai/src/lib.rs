pub mod anthropic_provider;
pub mod field_mappings;
pub mod filter_spec;
pub mod gemini_provider;
mod http;
pub mod llm_factory;
pub mod llm_provider;
pub mod nlp_query_parser;
pub mod openai_provider;

pub use anthropic_provider::AnthropicProvider;
pub use field_mappings::*;
pub use filter_spec::*;
pub use gemini_provider::GeminiProvider;
pub use llm_factory::*;
pub use llm_provider::*;
pub use nlp_query_parser::*;
pub use openai_provider::OpenAIProvider;
