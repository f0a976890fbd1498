use approx::assert_relative_eq;
use async_trait::async_trait;
use geoquery_ai::{Aggregation, FilterSpec, LLMProvider, NLQueryParser, OrderBy, SpatialFilter};
use geoquery_arcgis::{FeatureQueryClient, FeatureTransport};
use geoquery_core::{
    ErrorKind, GeoPoint, GeoQueryConfig, HttpReply, Result, RetryPolicy, TransportFailure,
};
use geoquery_query::{ExecutionResult, PlaceResolver, QueryExecutor};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Serves one fixed set of county rows and records the parameters of each call.
struct CountyService {
    rows: Vec<Value>,
    calls: Mutex<Vec<Vec<(String, String)>>>,
}

impl CountyService {
    fn new(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn last_param(&self, name: &str) -> Option<String> {
        self.calls
            .lock()
            .last()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl FeatureTransport for CountyService {
    async fn get(
        &self,
        _url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<HttpReply, TransportFailure> {
        self.calls.lock().push(params.to_vec());
        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse::<usize>().ok())
                .unwrap_or(0)
        };
        let offset = param("resultOffset");
        let count = param("resultRecordCount");

        let page: Vec<Value> = self
            .rows
            .iter()
            .skip(offset)
            .take(count)
            .map(|attributes| json!({ "attributes": attributes }))
            .collect();
        let more = offset + page.len() < self.rows.len();

        Ok(HttpReply::ok(
            json!({
                "fields": [
                    {"name": "OBJECTID", "type": "esriFieldTypeOID"},
                    {"name": "NAME", "type": "esriFieldTypeString"},
                    {"name": "STATE_NAME", "type": "esriFieldTypeString"},
                    {"name": "SQMI", "type": "esriFieldTypeDouble"},
                    {"name": "POPULATION", "type": "esriFieldTypeInteger"}
                ],
                "features": page,
                "exceededTransferLimit": more
            })
            .to_string(),
        ))
    }
}

fn counties() -> Vec<Value> {
    vec![
        json!({"OBJECTID": 1, "NAME": "Travis", "STATE_NAME": "Texas", "SQMI": 100, "POPULATION": 1300000}),
        json!({"OBJECTID": 2, "NAME": "Bexar", "STATE_NAME": "Texas", "SQMI": 50, "POPULATION": 2000000}),
        json!({"OBJECTID": 3, "NAME": "Brewster", "STATE_NAME": "Texas", "SQMI": 300, "POPULATION": null}),
        json!({"OBJECTID": 4, "NAME": "Rockwall", "STATE_NAME": "Texas", "SQMI": 20, "POPULATION": 100000}),
        json!({"OBJECTID": 5, "NAME": "Hays", "STATE_NAME": "Texas", "SQMI": 75, "POPULATION": 250000}),
    ]
}

fn executor(service: Arc<CountyService>) -> QueryExecutor {
    let mut config = GeoQueryConfig::default();
    config.cache.enabled = false;
    config.query.default_page_size = 2;
    let client = FeatureQueryClient::with_transport(
        "https://services.example.com/Counties/FeatureServer/0",
        &config,
        service,
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::immediate(0));
    QueryExecutor::new(Arc::new(client))
}

fn sqmi(result: &ExecutionResult) -> Vec<f64> {
    result
        .as_features()
        .unwrap()
        .collection
        .features
        .iter()
        .filter_map(|f| f.numeric_attribute("SQMI"))
        .collect()
}

#[tokio::test]
async fn test_sort_desc_then_limit() {
    let executor = executor(CountyService::new(counties()));
    let spec = FilterSpec::new("STATE_NAME = 'Texas'")
        .with_order_by(OrderBy::desc("SQMI"))
        .with_limit(3);

    let result = executor.execute(&spec, None).await.unwrap();

    assert_eq!(sqmi(&result), vec![300.0, 100.0, 75.0]);
    let features = result.as_features().unwrap();
    assert_eq!(features.count, 3);
    assert_eq!(features.query.order_by, Some(OrderBy::desc("SQMI")));
    assert_eq!(features.query.limit, Some(3));
}

#[tokio::test]
async fn test_count_short_circuits_sort_and_limit() {
    let service = CountyService::new(counties());
    let executor = executor(service.clone());
    let spec = FilterSpec::new("STATE_NAME = 'Texas'")
        .with_order_by(OrderBy::desc("SQMI"))
        .with_limit(2)
        .with_aggregation(Aggregation::Count, None);

    let result = executor.execute(&spec, Some(1)).await.unwrap();
    let scalar = result.as_scalar().unwrap();

    assert_eq!(scalar.aggregation, Aggregation::Count);
    assert_relative_eq!(scalar.value, 5.0);
    // Page size 2 over 5 rows: the full set was fetched.
    assert_eq!(service.call_count(), 3);
}

#[tokio::test]
async fn test_sum_and_avg_skip_nulls() {
    let executor = executor(CountyService::new(counties()));

    let sum = executor
        .execute(
            &FilterSpec::new("1=1").with_aggregation(Aggregation::Sum, Some("POPULATION")),
            None,
        )
        .await
        .unwrap();
    let sum = sum.as_scalar().unwrap();
    assert_relative_eq!(sum.value, 3_650_000.0);
    assert_eq!(sum.sample_count, 4);

    let avg = executor
        .execute(
            &FilterSpec::new("1=1").with_aggregation(Aggregation::Avg, Some("SQMI")),
            None,
        )
        .await
        .unwrap();
    assert_relative_eq!(avg.as_scalar().unwrap().value, 109.0);
}

#[tokio::test]
async fn test_avg_over_empty_result_is_zero() {
    let executor = executor(CountyService::new(vec![]));
    let result = executor
        .execute(
            &FilterSpec::new("SQMI > 1e9").with_aggregation(Aggregation::Avg, Some("SQMI")),
            None,
        )
        .await
        .unwrap();
    let scalar = result.as_scalar().unwrap();
    assert_relative_eq!(scalar.value, 0.0);
    assert_eq!(scalar.sample_count, 0);
}

#[tokio::test]
async fn test_unknown_sort_field_is_validation_error() {
    let executor = executor(CountyService::new(counties()));
    let spec = FilterSpec::new("1=1").with_order_by(OrderBy::asc("ELEVATION"));

    let err = executor.execute(&spec, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_sum_without_field_rejected_before_network() {
    let service = CountyService::new(counties());
    let executor = executor(service.clone());
    let spec = FilterSpec::new("1=1").with_aggregation(Aggregation::Sum, None);

    let err = executor.execute(&spec, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_place_rejected_before_network() {
    let service = CountyService::new(counties());
    let executor = executor(service.clone());
    let spec = FilterSpec::new("1=1").with_spatial_filter(SpatialFilter::near_place("Gotham", 10.0));

    let err = executor.execute(&spec, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(service.call_count(), 0);
}

#[tokio::test]
async fn test_known_place_issues_nearby_query() {
    let service = CountyService::new(counties());
    let executor = executor(service.clone())
        .with_places(PlaceResolver::new().with_place("Test Town", GeoPoint::new(-100.0, 31.0)));
    let spec = FilterSpec::new("1=1")
        .with_spatial_filter(SpatialFilter::near_place("Austin, Texas", 50.0))
        .with_limit(1);

    let result = executor.execute(&spec, None).await.unwrap();
    assert_eq!(result.as_features().unwrap().count, 1);
    assert_eq!(
        service.last_param("spatialRel").as_deref(),
        Some("esriSpatialRelIntersects")
    );
    let geometry: Value = serde_json::from_str(&service.last_param("geometry").unwrap()).unwrap();
    assert_eq!(geometry["x"], -97.7431);

    let spatial = result.query().spatial.clone().unwrap();
    assert_eq!(spatial.location.as_deref(), Some("Austin, Texas"));
}

#[tokio::test]
async fn test_max_results_caps_fetch_without_sort() {
    let service = CountyService::new(counties());
    let executor = executor(service.clone());

    let result = executor.execute(&FilterSpec::new("1=1"), Some(2)).await.unwrap();
    assert_eq!(result.as_features().unwrap().count, 2);
    assert_eq!(service.call_count(), 1);
}

#[tokio::test]
async fn test_max_results_caps_sorted_output() {
    let service = CountyService::new(counties());
    let executor = executor(service.clone());
    let spec = FilterSpec::new("1=1").with_order_by(OrderBy::desc("SQMI"));

    let result = executor.execute(&spec, Some(2)).await.unwrap();
    assert_eq!(sqmi(&result), vec![300.0, 100.0]);
    assert_eq!(result.as_features().unwrap().count, 2);
    // The sort still saw every row.
    assert_eq!(service.call_count(), 3);

    let limited = executor
        .execute(&spec.clone().with_limit(4), Some(3))
        .await
        .unwrap();
    assert_eq!(sqmi(&limited), vec![300.0, 100.0, 75.0]);
}

struct FixedProvider(&'static str);

#[async_trait]
impl LLMProvider for FixedProvider {
    async fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String> {
        Ok(self.0.to_string())
    }

    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed-1"
    }
}

#[tokio::test]
async fn test_texas_question_end_to_end() {
    let parser = NLQueryParser::new(Arc::new(FixedProvider(
        r#"{"where_clause": "STATE_NAME = 'Texas' AND SQMI < 2500", "confidence": 0.9, "explanation": "area filter", "detected_fields": ["STATE_NAME", "SQMI"]}"#,
    )));
    let service = CountyService::new(counties());
    let executor = executor(service.clone());

    let spec = parser
        .parse("find counties in Texas under 2500 square miles")
        .await
        .unwrap();
    assert_eq!(spec.where_clause, "STATE_NAME = 'Texas' AND SQMI < 2500");

    let result = executor.execute(&spec, None).await.unwrap();
    let features = result.as_features().unwrap();
    assert_eq!(
        service.last_param("where").as_deref(),
        Some("STATE_NAME = 'Texas' AND SQMI < 2500")
    );
    assert_eq!(features.count, 5);
    assert_eq!(features.explanation, "area filter");
    assert_relative_eq!(features.confidence, 0.9);
}
