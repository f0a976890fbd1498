use crate::field_mappings::{field_mappings, ExampleQuery, DATASET_NAME, EXAMPLE_QUERIES, FIELD_MAPPINGS};
use crate::filter_spec::FilterSpec;
use crate::llm_factory::LLMProviderFactory;
use crate::llm_provider::LLMProvider;
use geoquery_cache::{CacheConfig, CacheKeyBuilder, CacheStats, ResponseCache};
use geoquery_core::{GeoQueryConfig, GeoQueryError, Result};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TOKENS: usize = 1536;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const PROMPT_EXAMPLES: usize = 5;
const CACHE_NAMESPACE: &str = "nl";

/// Translates natural-language questions into [`FilterSpec`]s through an LLM.
pub struct NLQueryParser {
    provider: Arc<dyn LLMProvider>,
    cache: Option<Arc<ResponseCache<FilterSpec>>>,
    max_tokens: usize,
}

impl NLQueryParser {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            cache: Some(Arc::new(ResponseCache::with_ttl(DEFAULT_CACHE_TTL))),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Build the configured provider and a translation cache from `[llm]`.
    pub fn from_config(config: &GeoQueryConfig) -> Result<Self> {
        let provider = LLMProviderFactory::create_from_config(config)?;
        let llm = &config.llm;
        let cache = llm.cache_enabled.then(|| {
            Arc::new(ResponseCache::new(
                CacheConfig::default().with_ttl(Duration::from_secs(llm.cache_ttl_secs)),
            ))
        });

        info!(
            provider = provider.provider_name(),
            model = provider.model_name(),
            cache_enabled = cache.is_some(),
            "NL query parser initialized"
        );

        Ok(Self {
            provider,
            cache,
            max_tokens: llm.max_tokens,
        })
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache<FilterSpec>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub async fn parse(&self, natural_query: &str) -> Result<FilterSpec> {
        self.parse_with_options(natural_query, true).await
    }

    /// Translate one query; `use_cache = false` forces a fresh model call.
    pub async fn parse_with_options(&self, natural_query: &str, use_cache: bool) -> Result<FilterSpec> {
        if natural_query.trim().is_empty() {
            return Err(GeoQueryError::validation("Query cannot be empty"));
        }

        let cache = self.cache.as_ref().filter(|_| use_cache);
        let key = self.cache_key(natural_query);
        if let Some(spec) = cache.and_then(|c| c.get(&key)) {
            info!(query = natural_query, "Retrieved translation from cache");
            return Ok(spec);
        }

        info!(
            query = natural_query,
            provider = self.provider.provider_name(),
            "Translating natural language query"
        );
        let started = Instant::now();
        let prompt = build_prompt(natural_query);

        let response = self
            .provider
            .generate(&prompt, self.max_tokens)
            .await
            .map_err(|e| match e {
                GeoQueryError::Validation(_) | GeoQueryError::Translation(_) => e,
                other => GeoQueryError::translation(other.to_string()),
            })?;

        let spec = FilterSpec::from_model_response(&response).map_err(|e| {
            warn!(query = natural_query, error = %e, "Failed to parse model response");
            e
        })?;

        if let Some(cache) = &self.cache {
            cache.set(key, spec.clone(), None);
        }

        info!(
            query = natural_query,
            where_clause = %spec.where_clause,
            confidence = spec.confidence,
            has_order_by = spec.order_by.is_some(),
            has_limit = spec.limit.is_some(),
            has_aggregation = spec.aggregation.is_some(),
            has_spatial = spec.spatial_filter.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query translated"
        );
        Ok(spec)
    }

    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.as_ref().map(|c| c.clear()).unwrap_or(0);
        debug!(cleared, "Translation cache cleared");
        cleared
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn get_field_mappings() -> BTreeMap<&'static str, &'static str> {
        field_mappings()
    }

    pub fn get_supported_queries() -> &'static [ExampleQuery] {
        EXAMPLE_QUERIES
    }

    fn cache_key(&self, natural_query: &str) -> String {
        CacheKeyBuilder::new(CACHE_NAMESPACE)
            .normalized_text("query", natural_query)
            .text("provider", self.provider.provider_name())
            .text("model", self.provider.model_name())
            .build()
    }
}

/// The full translation prompt for `natural_query`.
pub fn build_prompt(natural_query: &str) -> String {
    let mut fields = String::new();
    for (synonym, field) in FIELD_MAPPINGS {
        let _ = writeln!(fields, "  - {}: {}", synonym, field);
    }

    let examples = EXAMPLE_QUERIES
        .iter()
        .take(PROMPT_EXAMPLES)
        .enumerate()
        .map(|(i, example)| render_example(i + 1, example))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are an expert at converting natural language queries into ArcGIS queries with advanced features.

Dataset: {dataset}
Available Fields:
{fields}
Your task: Convert the following natural language query into a structured ArcGIS query with:
1. WHERE clause (filtering conditions)
2. ORDER BY (for "top", "largest", "smallest", "highest", "lowest")
3. LIMIT (for "top N", "first N", "N largest", etc.)
4. Aggregation (for "count", "how many", "total", "average")
5. Spatial filters (for "near", "within N miles of")

Examples:
{examples}

IMPORTANT RULES:
1. Use ONLY the field names from the Available Fields list above
2. String values must be in single quotes (e.g., 'Texas')
3. Use proper SQL operators: =, !=, <, >, <=, >=, AND, OR, IN
4. For "top N largest", use ORDER BY field DESC with LIMIT N
5. For "smallest N", use ORDER BY field ASC with LIMIT N
6. For "how many" or "count", set aggregation to "COUNT"
7. For "total" or "average", set aggregation to "SUM" or "AVG" and name the field in aggregation_field
8. For spatial queries like "near City", extract location and distance
9. Set order_by, limit, aggregation and spatial_filter to null when not needed

Query to convert: "{query}"

Respond in JSON format with the following structure:
{{
  "where_clause": "the SQL WHERE clause",
  "confidence": 0.95,
  "explanation": "brief explanation of the conversion",
  "detected_fields": ["list", "of", "field", "names"],
  "order_by": "FIELD_NAME DESC" or null,
  "limit": 5 or null,
  "aggregation": "COUNT" or "SUM" or "AVG" or null,
  "aggregation_field": "FIELD_NAME" or null,
  "spatial_filter": {{"type": "point", "location": "City, State", "distance_miles": 50}} or null
}}

Only respond with the JSON, no other text."#,
        dataset = DATASET_NAME,
        fields = fields,
        examples = examples,
        query = natural_query.trim(),
    )
}

fn render_example(number: usize, example: &ExampleQuery) -> String {
    let mut text = format!(
        "Example {}:\nNatural Language: {}\nWHERE Clause: {}\n",
        number, example.natural_language, example.where_clause
    );
    if let Some(order_by) = example.order_by {
        let _ = writeln!(text, "ORDER BY: {}", order_by);
    }
    if let Some(limit) = example.limit {
        let _ = writeln!(text, "LIMIT: {}", limit);
    }
    if let Some(aggregation) = example.aggregation {
        let _ = writeln!(text, "Aggregation: {}", aggregation);
    }
    if let Some((location, distance)) = example.spatial_filter {
        let _ = writeln!(
            text,
            "Spatial Filter: {}",
            serde_json::json!({"type": "point", "location": location, "distance_miles": distance})
        );
    }
    let _ = write!(text, "Description: {}", example.description);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_mappings_examples_and_query() {
        let prompt = build_prompt("  largest counties in Ohio ");
        assert!(prompt.contains("  - square miles: SQMI"));
        assert!(prompt.contains("Example 1:\nNatural Language: find counties in Texas under 2500 square miles"));
        assert!(prompt.contains("ORDER BY: SQMI DESC"));
        assert!(prompt.contains("\"location\":\"Austin, Texas\""));
        assert!(prompt.contains("Query to convert: \"largest counties in Ohio\""));
        assert!(!prompt.contains("Example 6:"));
    }

    #[test]
    fn test_static_reference_data() {
        assert_eq!(NLQueryParser::get_field_mappings()["pop"], "POPULATION");
        assert_eq!(NLQueryParser::get_supported_queries().len(), 8);
    }
}
