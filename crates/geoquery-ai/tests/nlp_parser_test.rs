use async_trait::async_trait;
use geoquery_ai::{Aggregation, LLMProvider, NLQueryParser, OrderBy, SpatialCenter};
use geoquery_core::{ErrorKind, GeoQueryConfig, GeoQueryError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Returns scripted completions in order and records prompts.
struct CannedProvider {
    model: String,
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<(String, usize)>>,
}

impl CannedProvider {
    fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Self::with_model("canned-1", responses)
    }

    fn with_model(model: &str, responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LLMProvider for CannedProvider {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        self.prompts.lock().push((prompt.to_string(), max_tokens));
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GeoQueryError::translation("no canned response left")))
    }

    fn provider_name(&self) -> &str {
        "canned"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

const TEXAS_RESPONSE: &str = r#"{
  "where_clause": "STATE_NAME = 'Texas' AND SQMI < 2500",
  "confidence": 0.95,
  "explanation": "Counties in Texas with area below 2500 square miles",
  "detected_fields": ["STATE_NAME", "SQMI"],
  "order_by": null,
  "limit": null,
  "aggregation": null,
  "spatial_filter": null
}"#;

#[tokio::test]
async fn test_texas_example_end_to_end() {
    let provider = CannedProvider::new(vec![Ok(TEXAS_RESPONSE.to_string())]);
    let parser = NLQueryParser::new(provider.clone());

    let spec = parser
        .parse("find counties in Texas under 2500 square miles")
        .await
        .unwrap();

    assert_eq!(spec.where_clause, "STATE_NAME = 'Texas' AND SQMI < 2500");
    assert_eq!(spec.confidence, 0.95);
    assert!(spec.detected_fields.contains("STATE_NAME"));

    let prompts = provider.prompts.lock();
    let (prompt, max_tokens) = &prompts[0];
    assert_eq!(*max_tokens, 1536);
    assert!(prompt.contains("find counties in Texas under 2500 square miles"));
    assert!(prompt.contains("square miles: SQMI"));
}

#[tokio::test]
async fn test_empty_query_is_validation_error_without_model_call() {
    let provider = CannedProvider::new(vec![]);
    let parser = NLQueryParser::new(provider.clone());

    let err = parser.parse("   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_missing_where_clause_is_translation_error() {
    let provider = CannedProvider::new(vec![Ok(r#"{"confidence": 0.4}"#.to_string())]);
    let parser = NLQueryParser::new(provider);

    let err = parser.parse("something vague").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Translation);
}

#[tokio::test]
async fn test_unknown_keys_are_tolerated() {
    let provider = CannedProvider::new(vec![Ok(
        r#"{"where_clause": "1=1", "reasoning_trace": ["a", "b"], "dialect": "sql92"}"#.to_string(),
    )]);
    let parser = NLQueryParser::new(provider);

    let spec = parser.parse("all counties").await.unwrap();
    assert_eq!(spec.where_clause, "1=1");
}

#[tokio::test]
async fn test_backend_failure_is_translation_error() {
    let provider = CannedProvider::new(vec![Err(GeoQueryError::connection(
        "anthropic completion failed after 4 attempts: HTTP 529",
    ))]);
    let parser = NLQueryParser::new(provider);

    let err = parser.parse("counties in Ohio").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Translation);
}

#[tokio::test]
async fn test_cache_collapses_equivalent_queries() {
    let provider = CannedProvider::new(vec![Ok(TEXAS_RESPONSE.to_string())]);
    let parser = NLQueryParser::new(provider.clone());

    let first = parser.parse("Counties in Texas under 2500 sq miles").await.unwrap();
    let second = parser
        .parse("  counties in texas   under 2500 sq miles ")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);
    assert_eq!(parser.cache_stats().unwrap().hits, 1);
}

#[tokio::test]
async fn test_cache_bypass_and_clear() {
    let provider = CannedProvider::new(vec![
        Ok(TEXAS_RESPONSE.to_string()),
        Ok(TEXAS_RESPONSE.to_string()),
        Ok(TEXAS_RESPONSE.to_string()),
    ]);
    let parser = NLQueryParser::new(provider.clone());

    parser.parse("texas counties").await.unwrap();
    parser.parse_with_options("texas counties", false).await.unwrap();
    assert_eq!(provider.calls(), 2);

    assert_eq!(parser.clear_cache(), 1);
    parser.parse("texas counties").await.unwrap();
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_cache_keyed_by_model() {
    let shared = Arc::new(geoquery_cache::ResponseCache::with_ttl(
        std::time::Duration::from_secs(60),
    ));
    let a = CannedProvider::with_model("model-a", vec![Ok(TEXAS_RESPONSE.to_string())]);
    let b = CannedProvider::with_model("model-b", vec![Ok(TEXAS_RESPONSE.to_string())]);

    NLQueryParser::new(a.clone())
        .with_cache(shared.clone())
        .parse("texas counties")
        .await
        .unwrap();
    NLQueryParser::new(b.clone())
        .with_cache(shared.clone())
        .parse("texas counties")
        .await
        .unwrap();

    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    assert_eq!(shared.len(), 2);
}

#[tokio::test]
async fn test_disabled_cache_always_calls_model() {
    let provider = CannedProvider::new(vec![
        Ok(TEXAS_RESPONSE.to_string()),
        Ok(TEXAS_RESPONSE.to_string()),
    ]);
    let parser = NLQueryParser::new(provider.clone()).without_cache();

    parser.parse("texas counties").await.unwrap();
    parser.parse("texas counties").await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert!(parser.cache_stats().is_none());
}

#[tokio::test]
async fn test_advanced_fields_parse() {
    let provider = CannedProvider::new(vec![Ok(r#"```json
{
  "where_clause": "STATE_NAME = 'Texas'",
  "confidence": 0.9,
  "explanation": "Top 5 by area",
  "detected_fields": ["STATE_NAME", "SQMI"],
  "order_by": "SQMI DESC",
  "limit": 5,
  "aggregation": "count",
  "spatial_filter": {"type": "point", "location": "Austin, Texas", "distance_miles": 30}
}
```"#
        .to_string())]);
    let parser = NLQueryParser::new(provider);

    let spec = parser.parse("top 5 largest counties in Texas").await.unwrap();
    assert_eq!(spec.order_by, Some(OrderBy::desc("SQMI")));
    assert_eq!(spec.limit, Some(5));
    assert_eq!(spec.aggregation, Some(Aggregation::Count));
    let spatial = spec.spatial_filter.unwrap();
    assert_eq!(spatial.center, SpatialCenter::Place("Austin, Texas".to_string()));
    assert_eq!(spatial.distance_miles, 30.0);
}

#[test]
fn test_from_config_rejects_unknown_provider() {
    let mut config = GeoQueryConfig::default();
    config.llm.provider = "llama".to_string();
    let err = NLQueryParser::from_config(&config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
