use geoquery_core::{GeoPoint, GeoQueryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SPATIAL_DISTANCE_MILES: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = GeoQueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ASC" | "ASCENDING" => Ok(SortDirection::Asc),
            "DESC" | "DESCENDING" => Ok(SortDirection::Desc),
            other => Err(GeoQueryError::translation(format!(
                "Invalid sort direction: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.direction.as_str())
    }
}

/// Parses `"FIELD"` or `"FIELD DESC"`.
impl FromStr for OrderBy {
    type Err = GeoQueryError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let field = parts
            .next()
            .ok_or_else(|| GeoQueryError::translation("order_by must name a field"))?;
        let direction = match parts.next() {
            Some(direction) => direction.parse()?,
            None => SortDirection::Asc,
        };
        if parts.next().is_some() {
            return Err(GeoQueryError::translation(format!(
                "order_by must be 'FIELD [ASC|DESC]', got '{}'",
                s
            )));
        }
        Ok(Self::new(field, direction))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Count => "COUNT",
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
        }
    }

    /// Whether the aggregation reads an attribute value.
    pub fn needs_field(&self) -> bool {
        !matches!(self, Aggregation::Count)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = GeoQueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "COUNT" => Ok(Aggregation::Count),
            "SUM" | "TOTAL" => Ok(Aggregation::Sum),
            "AVG" | "AVERAGE" | "MEAN" => Ok(Aggregation::Avg),
            other => Err(GeoQueryError::translation(format!(
                "Unsupported aggregation: {}",
                other
            ))),
        }
    }
}

/// Center of a proximity search: a named place or explicit coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialCenter {
    Place(String),
    Coordinates(GeoPoint),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    pub center: SpatialCenter,
    pub distance_miles: f64,
}

impl SpatialFilter {
    pub fn near_place(place: impl Into<String>, distance_miles: f64) -> Self {
        Self {
            center: SpatialCenter::Place(place.into()),
            distance_miles,
        }
    }

    pub fn near_point(point: GeoPoint, distance_miles: f64) -> Self {
        Self {
            center: SpatialCenter::Coordinates(point),
            distance_miles,
        }
    }
}

/// Structured filter produced by the translator.
///
/// `confidence` and `explanation` are advisory model output; only the shape
/// of the record is checked, never the meaning of the filter text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub where_clause: String,
    pub confidence: f64,
    pub explanation: String,
    pub detected_fields: BTreeSet<String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub aggregation: Option<Aggregation>,
    /// Attribute summed or averaged by `SUM`/`AVG`
    pub aggregation_field: Option<String>,
    pub spatial_filter: Option<SpatialFilter>,
}

impl FilterSpec {
    pub fn new(where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            confidence: 1.0,
            explanation: String::new(),
            detected_fields: BTreeSet::new(),
            order_by: None,
            limit: None,
            aggregation: None,
            aggregation_field: None,
            spatial_filter: None,
        }
    }

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation, field: Option<&str>) -> Self {
        self.aggregation = Some(aggregation);
        self.aggregation_field = field.map(str::to_string);
        self
    }

    pub fn with_spatial_filter(mut self, spatial_filter: SpatialFilter) -> Self {
        self.spatial_filter = Some(spatial_filter);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    /// Parse the raw text a model returned for the translation prompt.
    ///
    /// Markdown code fences and surrounding prose are tolerated; unknown keys
    /// are ignored. A missing `where_clause` or a malformed optional field
    /// is a translation error.
    pub fn from_model_response(text: &str) -> Result<Self> {
        let json = extract_json_object(text).ok_or_else(|| {
            GeoQueryError::translation(format!(
                "Model response does not contain a JSON object: {}",
                preview(text)
            ))
        })?;

        let value: Value = serde_json::from_str(json).map_err(|e| {
            GeoQueryError::translation(format!("Failed to parse model response as JSON: {}", e))
        })?;
        let object = value
            .as_object()
            .ok_or_else(|| GeoQueryError::translation("Model response must be a JSON object"))?;

        let where_clause = match object.get("where_clause") {
            Some(Value::String(clause)) if !clause.trim().is_empty() => clause.trim().to_string(),
            Some(Value::String(_)) => {
                return Err(GeoQueryError::translation(
                    "Model response has an empty where_clause",
                ))
            }
            Some(_) => {
                return Err(GeoQueryError::translation(
                    "Model response where_clause must be a string",
                ))
            }
            None => {
                return Err(GeoQueryError::translation(
                    "Model response is missing required field 'where_clause'",
                ))
            }
        };

        Ok(Self {
            where_clause,
            confidence: parse_confidence(object.get("confidence"))?,
            explanation: optional_string(object, "explanation")?.unwrap_or_default(),
            detected_fields: parse_detected_fields(object.get("detected_fields"))?,
            order_by: parse_order_by(object.get("order_by"))?,
            limit: parse_limit(object.get("limit"))?,
            aggregation: optional_string(object, "aggregation")?
                .map(|a| a.parse::<Aggregation>())
                .transpose()?,
            aggregation_field: optional_string(object, "aggregation_field")?,
            spatial_filter: parse_spatial_filter(object.get("spatial_filter"))?,
        })
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(GeoQueryError::translation(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn parse_confidence(value: Option<&Value>) -> Result<f64> {
    if is_absent(value) {
        return Ok(0.0);
    }
    value
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
        .ok_or_else(|| GeoQueryError::translation("'confidence' must be a number"))
}

fn parse_detected_fields(value: Option<&Value>) -> Result<BTreeSet<String>> {
    match value {
        None | Some(Value::Null) => Ok(BTreeSet::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    GeoQueryError::translation("'detected_fields' must contain only strings")
                })
            })
            .collect(),
        Some(_) => Err(GeoQueryError::translation(
            "'detected_fields' must be a list of strings",
        )),
    }
}

fn parse_order_by(value: Option<&Value>) -> Result<Option<OrderBy>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(Value::Object(object)) => {
            let field = optional_string(object, "field")?
                .ok_or_else(|| GeoQueryError::translation("order_by object needs a 'field'"))?;
            let direction = match optional_string(object, "direction")? {
                Some(direction) => direction.parse()?,
                None => SortDirection::Asc,
            };
            Ok(Some(OrderBy::new(field, direction)))
        }
        Some(other) => Err(GeoQueryError::translation(format!(
            "'order_by' must be a string or object, got {}",
            other
        ))),
    }
}

fn parse_limit(value: Option<&Value>) -> Result<Option<usize>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let limit = match value.as_u64() {
        Some(n) => Some(n),
        None => value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
            .map(|f| f as u64),
    };
    match limit {
        Some(n) if n > 0 => Ok(Some(n as usize)),
        _ => Err(GeoQueryError::translation(format!(
            "'limit' must be a positive integer, got {}",
            value
        ))),
    }
}

fn parse_spatial_filter(value: Option<&Value>) -> Result<Option<SpatialFilter>> {
    let object = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(object)) => object,
        Some(other) => {
            return Err(GeoQueryError::translation(format!(
                "'spatial_filter' must be an object, got {}",
                other
            )))
        }
    };

    let distance_miles = match object.get("distance_miles") {
        None | Some(Value::Null) => DEFAULT_SPATIAL_DISTANCE_MILES,
        Some(v) => v
            .as_f64()
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| {
                GeoQueryError::translation(format!(
                    "'distance_miles' must be a positive number, got {}",
                    v
                ))
            })?,
    };

    let longitude = object.get("longitude").and_then(Value::as_f64);
    let latitude = object.get("latitude").and_then(Value::as_f64);
    let center = match (longitude, latitude, optional_string(object, "location")?) {
        (Some(x), Some(y), _) => SpatialCenter::Coordinates(GeoPoint::new(x, y)),
        (_, _, Some(location)) => SpatialCenter::Place(location),
        _ => {
            return Err(GeoQueryError::translation(
                "'spatial_filter' needs a 'location' or 'longitude'/'latitude'",
            ))
        }
    };

    Ok(Some(SpatialFilter {
        center,
        distance_miles,
    }))
}

/// Locate the JSON object inside a model response, stripping code fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
