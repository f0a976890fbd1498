use crate::places::PlaceResolver;
use geoquery_ai::{Aggregation, FilterSpec, OrderBy, SortDirection, SpatialCenter};
use geoquery_arcgis::{FeatureQueryClient, NearbyRequest};
use geoquery_core::{Feature, FeatureCollection, GeoPoint, GeoQueryError, Result};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The filter as it was actually run, echoed for traceability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEcho {
    pub where_clause: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial: Option<ResolvedSpatial>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSpatial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub point: GeoPoint,
    pub distance_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureResult {
    pub collection: FeatureCollection,
    pub count: usize,
    pub query: QueryEcho,
    pub explanation: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub aggregation: Aggregation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub value: f64,
    /// Features that contributed a value
    pub sample_count: usize,
    pub query: QueryEcho,
    pub explanation: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionResult {
    Features(FeatureResult),
    Scalar(AggregateResult),
}

impl ExecutionResult {
    pub fn query(&self) -> &QueryEcho {
        match self {
            ExecutionResult::Features(result) => &result.query,
            ExecutionResult::Scalar(result) => &result.query,
        }
    }

    pub fn as_features(&self) -> Option<&FeatureResult> {
        match self {
            ExecutionResult::Features(result) => Some(result),
            ExecutionResult::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&AggregateResult> {
        match self {
            ExecutionResult::Scalar(result) => Some(result),
            ExecutionResult::Features(_) => None,
        }
    }
}

/// Runs a [`FilterSpec`] against a feature service.
pub struct QueryExecutor {
    client: Arc<FeatureQueryClient>,
    places: PlaceResolver,
}

impl QueryExecutor {
    pub fn new(client: Arc<FeatureQueryClient>) -> Self {
        Self {
            client,
            places: PlaceResolver::default(),
        }
    }

    pub fn with_places(mut self, places: PlaceResolver) -> Self {
        self.places = places;
        self
    }

    pub fn client(&self) -> &FeatureQueryClient {
        &self.client
    }

    /// Fetch, then aggregate or sort and limit.
    ///
    /// Every locally detectable problem (empty filter, unknown place,
    /// aggregation without a field) is reported before any request is sent.
    pub async fn execute(
        &self,
        spec: &FilterSpec,
        max_results: Option<usize>,
    ) -> Result<ExecutionResult> {
        validate_spec(spec, max_results)?;
        let spatial = self.resolve_spatial(spec)?;
        let started = Instant::now();

        info!(
            where_clause = %spec.where_clause,
            has_order_by = spec.order_by.is_some(),
            has_limit = spec.limit.is_some(),
            has_aggregation = spec.aggregation.is_some(),
            has_spatial = spatial.is_some(),
            "Executing filter"
        );

        let cap = match (max_results, spec.limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut request = self.client.request(spec.where_clause.as_str());
        // Sorting and aggregating need the whole result set.
        if spec.aggregation.is_none() && spec.order_by.is_none() {
            if let Some(cap) = cap {
                request.max_features = Some(cap);
                request.page_size = request.page_size.min(cap);
            }
        }

        let collection = match &spatial {
            Some(spatial) => {
                let nearby = NearbyRequest::new(spatial.point, spatial.distance_miles)
                    .with_query(request);
                self.client.query_nearby(&nearby).await?
            }
            None => self.client.query(&request).await?,
        };

        if collection.max_pages_reached {
            warn!(
                features = collection.len(),
                "Result set is partial; ordering and aggregates cover fetched features only"
            );
        }

        let echo = QueryEcho {
            where_clause: spec.where_clause.clone(),
            order_by: spec.order_by.clone(),
            limit: spec.limit,
            spatial,
        };

        if let Some(aggregation) = spec.aggregation {
            let result = aggregate(&collection, aggregation, spec, echo)?;
            info!(
                aggregation = %aggregation,
                value = result.value,
                sample_count = result.sample_count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Aggregation complete"
            );
            return Ok(ExecutionResult::Scalar(result));
        }

        let mut collection = collection;
        if let Some(order_by) = &spec.order_by {
            sort_features(&mut collection, order_by)?;
        }
        if let Some(cap) = cap {
            collection.features.truncate(cap);
        }

        let count = collection.len();
        info!(
            count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Execution complete"
        );

        Ok(ExecutionResult::Features(FeatureResult {
            collection,
            count,
            query: echo,
            explanation: spec.explanation.clone(),
            confidence: spec.confidence,
        }))
    }

    fn resolve_spatial(&self, spec: &FilterSpec) -> Result<Option<ResolvedSpatial>> {
        let Some(filter) = &spec.spatial_filter else {
            return Ok(None);
        };
        if !filter.distance_miles.is_finite() || filter.distance_miles <= 0.0 {
            return Err(GeoQueryError::validation(
                "spatial filter distance must be a positive number",
            ));
        }

        let (location, point) = match &filter.center {
            SpatialCenter::Place(place) => (Some(place.clone()), self.places.resolve(place)?),
            SpatialCenter::Coordinates(point) => (None, *point),
        };
        Ok(Some(ResolvedSpatial {
            location,
            point,
            distance_miles: filter.distance_miles,
        }))
    }
}

fn validate_spec(spec: &FilterSpec, max_results: Option<usize>) -> Result<()> {
    if spec.where_clause.trim().is_empty() {
        return Err(GeoQueryError::validation("where_clause must be non-empty"));
    }
    if spec.limit == Some(0) {
        return Err(GeoQueryError::validation("limit must be positive"));
    }
    if max_results == Some(0) {
        return Err(GeoQueryError::validation("max_results must be positive"));
    }
    if let Some(aggregation) = spec.aggregation {
        let has_field = spec
            .aggregation_field
            .as_deref()
            .is_some_and(|f| !f.trim().is_empty());
        if aggregation.needs_field() && !has_field {
            return Err(GeoQueryError::validation(format!(
                "{} aggregation requires an aggregation_field",
                aggregation
            )));
        }
    }
    Ok(())
}

/// A field is unknown when the collection carries a schema or features and
/// none of them mention it. An empty, schema-less result cannot be checked.
fn ensure_known_field(collection: &FeatureCollection, field: &str, purpose: &str) -> Result<()> {
    let checkable = !collection.fields.is_empty() || !collection.is_empty();
    if checkable && !collection.has_field(field) {
        return Err(GeoQueryError::validation(format!(
            "Cannot {} on unknown field '{}'",
            purpose, field
        )));
    }
    Ok(())
}

fn aggregate(
    collection: &FeatureCollection,
    aggregation: Aggregation,
    spec: &FilterSpec,
    query: QueryEcho,
) -> Result<AggregateResult> {
    let field = spec.aggregation_field.clone().filter(|_| aggregation.needs_field());

    let (value, sample_count) = match (&field, aggregation) {
        (None, _) | (_, Aggregation::Count) => (collection.len() as f64, collection.len()),
        (Some(field), _) => {
            ensure_known_field(collection, field, "aggregate")?;
            let values: Vec<f64> = collection
                .features
                .iter()
                .filter_map(|f| f.numeric_attribute(field))
                .collect();
            let sum: f64 = values.iter().sum();
            let value = match aggregation {
                Aggregation::Avg if values.is_empty() => 0.0,
                Aggregation::Avg => sum / values.len() as f64,
                _ => sum,
            };
            (value, values.len())
        }
    };

    Ok(AggregateResult {
        aggregation,
        field,
        value,
        sample_count,
        query,
        explanation: spec.explanation.clone(),
        confidence: spec.confidence,
    })
}

#[derive(Debug, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
}

fn sort_key(feature: &Feature, field: &str, numeric: bool) -> Option<SortKey> {
    if numeric {
        return feature.numeric_attribute(field).map(SortKey::Number);
    }
    match feature.attribute(field)? {
        Value::Null => None,
        Value::String(s) => Some(SortKey::Text(s.clone())),
        other => Some(SortKey::Text(other.to_string())),
    }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
        (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
    }
}

/// Stable sort; features without a value for `field` go last in either direction.
fn sort_features(collection: &mut FeatureCollection, order_by: &OrderBy) -> Result<()> {
    ensure_known_field(collection, &order_by.field, "sort")?;
    let numeric = collection.is_numeric_field(&order_by.field);

    let mut keyed: Vec<(Option<SortKey>, Feature)> = std::mem::take(&mut collection.features)
        .into_iter()
        .map(|feature| (sort_key(&feature, &order_by.field, numeric), feature))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => match order_by.direction {
            SortDirection::Asc => compare_keys(a, b),
            SortDirection::Desc => compare_keys(b, a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    collection.features = keyed.into_iter().map(|(_, feature)| feature).collect();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn feature(id: i64, sqmi: Value, name: &str) -> Feature {
        let mut attributes = Map::new();
        attributes.insert("OBJECTID".into(), json!(id));
        attributes.insert("SQMI".into(), sqmi);
        attributes.insert("NAME".into(), json!(name));
        Feature::new(attributes)
    }

    fn collection(features: Vec<Feature>) -> FeatureCollection {
        FeatureCollection {
            features,
            ..Default::default()
        }
    }

    fn ids(collection: &FeatureCollection) -> Vec<i64> {
        collection.features.iter().filter_map(Feature::id).collect()
    }

    #[test]
    fn test_numeric_sort_desc_nulls_last() {
        let mut c = collection(vec![
            feature(1, json!(100), "A"),
            feature(2, Value::Null, "B"),
            feature(3, json!(300), "C"),
            feature(4, json!(20), "D"),
        ]);
        sort_features(&mut c, &OrderBy::desc("SQMI")).unwrap();
        assert_eq!(ids(&c), vec![3, 1, 4, 2]);

        sort_features(&mut c, &OrderBy::asc("SQMI")).unwrap();
        assert_eq!(ids(&c), vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_numeric_sort_is_not_lexicographic() {
        let mut c = collection(vec![
            feature(1, json!(9), "A"),
            feature(2, json!(10), "B"),
            feature(3, json!(100), "C"),
        ]);
        sort_features(&mut c, &OrderBy::asc("SQMI")).unwrap();
        assert_eq!(ids(&c), vec![1, 2, 3]);
    }

    #[test]
    fn test_text_sort_is_stable() {
        let mut c = collection(vec![
            feature(1, json!(1), "Travis"),
            feature(2, json!(2), "Bexar"),
            feature(3, json!(3), "Travis"),
            feature(4, json!(4), "Harris"),
        ]);
        sort_features(&mut c, &OrderBy::asc("NAME")).unwrap();
        assert_eq!(ids(&c), vec![2, 4, 1, 3]);

        sort_features(&mut c, &OrderBy::desc("NAME")).unwrap();
        assert_eq!(ids(&c), vec![1, 3, 4, 2]);
    }

    #[test]
    fn test_sort_on_unknown_field_is_validation_error() {
        let mut c = collection(vec![feature(1, json!(1), "A")]);
        let err = sort_features(&mut c, &OrderBy::asc("ELEVATION")).unwrap_err();
        assert!(matches!(err, GeoQueryError::Validation(_)));
    }

    #[test]
    fn test_validate_spec() {
        assert!(validate_spec(&FilterSpec::new(" "), None).is_err());
        assert!(validate_spec(&FilterSpec::new("1=1").with_limit(0), None).is_err());
        assert!(validate_spec(&FilterSpec::new("1=1"), Some(0)).is_err());
        assert!(validate_spec(
            &FilterSpec::new("1=1").with_aggregation(Aggregation::Sum, None),
            None
        )
        .is_err());
        assert!(validate_spec(
            &FilterSpec::new("1=1").with_aggregation(Aggregation::Count, None),
            None
        )
        .is_ok());
    }
}
