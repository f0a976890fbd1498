use geoquery_core::{GeoPoint, GeoQueryError, QueryConfig, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WHERE: &str = "1=1";
pub const DISTANCE_UNITS: &str = "esriSRUnit_StatuteMile";
pub const POINT_GEOMETRY_TYPE: &str = "esriGeometryPoint";

/// ArcGIS spatial relationship operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpatialRelationship {
    #[default]
    Intersects,
    Contains,
    Crosses,
    EnvelopeIntersects,
    IndexIntersects,
    Overlaps,
    Touches,
    Within,
}

impl SpatialRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialRelationship::Intersects => "esriSpatialRelIntersects",
            SpatialRelationship::Contains => "esriSpatialRelContains",
            SpatialRelationship::Crosses => "esriSpatialRelCrosses",
            SpatialRelationship::EnvelopeIntersects => "esriSpatialRelEnvelopeIntersects",
            SpatialRelationship::IndexIntersects => "esriSpatialRelIndexIntersects",
            SpatialRelationship::Overlaps => "esriSpatialRelOverlaps",
            SpatialRelationship::Touches => "esriSpatialRelTouches",
            SpatialRelationship::Within => "esriSpatialRelWithin",
        }
    }
}

impl fmt::Display for SpatialRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpatialRelationship {
    type Err = GeoQueryError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        let key = key.strip_prefix("esrispatialrel").unwrap_or(&key);
        match key {
            "intersects" => Ok(SpatialRelationship::Intersects),
            "contains" => Ok(SpatialRelationship::Contains),
            "crosses" => Ok(SpatialRelationship::Crosses),
            "envelopeintersects" => Ok(SpatialRelationship::EnvelopeIntersects),
            "indexintersects" => Ok(SpatialRelationship::IndexIntersects),
            "overlaps" => Ok(SpatialRelationship::Overlaps),
            "touches" => Ok(SpatialRelationship::Touches),
            "within" => Ok(SpatialRelationship::Within),
            _ => Err(GeoQueryError::validation(format!(
                "Unknown spatial relationship: {}",
                s
            ))),
        }
    }
}

/// Attribute query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub where_clause: String,
    pub out_fields: Vec<String>,
    pub page_size: usize,
    pub paginate: bool,
    /// Page cap; the client's configured cap applies when unset.
    pub max_pages: Option<usize>,
    pub max_features: Option<usize>,
    pub return_geometry: bool,
    pub use_cache: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            where_clause: DEFAULT_WHERE.to_string(),
            out_fields: vec!["*".to_string()],
            page_size: 1000,
            paginate: true,
            max_pages: None,
            max_features: None,
            return_geometry: true,
            use_cache: true,
        }
    }
}

impl QueryRequest {
    pub fn new(where_clause: impl Into<String>) -> Self {
        Self {
            where_clause: where_clause.into(),
            ..Default::default()
        }
    }

    /// Defaults taken from the resolved query configuration.
    pub fn from_config(where_clause: impl Into<String>, config: &QueryConfig) -> Self {
        Self {
            where_clause: where_clause.into(),
            out_fields: split_fields(&config.default_out_fields),
            page_size: config.default_page_size,
            paginate: config.enable_pagination,
            ..Default::default()
        }
    }

    pub fn out_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.out_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn paginate(mut self, paginate: bool) -> Self {
        self.paginate = paginate;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    pub fn return_geometry(mut self, return_geometry: bool) -> Self {
        self.return_geometry = return_geometry;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn out_fields_param(&self) -> String {
        self.out_fields.join(",")
    }

    pub fn validate(&self) -> Result<()> {
        if self.where_clause.trim().is_empty() {
            return Err(GeoQueryError::validation(
                "where_clause must be a non-empty string",
            ));
        }
        if self.page_size == 0 {
            return Err(GeoQueryError::validation("page_size must be positive"));
        }
        if self.out_fields.is_empty() || self.out_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(GeoQueryError::validation(
                "out_fields must list at least one non-empty field",
            ));
        }
        if self.max_pages == Some(0) {
            return Err(GeoQueryError::validation(
                "max_pages must be positive when provided",
            ));
        }
        if self.max_features == Some(0) {
            return Err(GeoQueryError::validation(
                "max_features must be positive when provided",
            ));
        }
        Ok(())
    }
}

/// Spatial proximity query: features related to a buffered point.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyRequest {
    pub point: GeoPoint,
    pub distance_miles: f64,
    pub spatial_relationship: SpatialRelationship,
    pub query: QueryRequest,
}

impl NearbyRequest {
    pub fn new(point: GeoPoint, distance_miles: f64) -> Self {
        Self {
            point,
            distance_miles,
            spatial_relationship: SpatialRelationship::default(),
            query: QueryRequest::default(),
        }
    }

    pub fn with_query(mut self, query: QueryRequest) -> Self {
        self.query = query;
        self
    }

    pub fn spatial_relationship(mut self, relationship: SpatialRelationship) -> Self {
        self.spatial_relationship = relationship;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.point.is_finite() {
            return Err(GeoQueryError::validation(format!(
                "point coordinates must be finite, got {}",
                self.point
            )));
        }
        if !self.distance_miles.is_finite() || self.distance_miles <= 0.0 {
            return Err(GeoQueryError::validation(
                "distance must be a positive number",
            ));
        }
        self.query.validate()
    }
}

/// Spatial part of a page request, already rendered for the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpatialParams {
    pub point: GeoPoint,
    pub distance_miles: f64,
    pub relationship: SpatialRelationship,
    pub wkid: u32,
}

impl SpatialParams {
    pub fn geometry_json(&self) -> String {
        serde_json::json!({
            "x": self.point.x,
            "y": self.point.y,
            "spatialReference": {"wkid": self.wkid}
        })
        .to_string()
    }
}

/// Query-string parameters for one page, in a stable order.
pub(crate) fn page_params(
    request: &QueryRequest,
    spatial: Option<&SpatialParams>,
    offset: usize,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("f".to_string(), "json".to_string()),
        ("where".to_string(), request.where_clause.clone()),
        ("outFields".to_string(), request.out_fields_param()),
        (
            "returnGeometry".to_string(),
            request.return_geometry.to_string(),
        ),
        ("resultRecordCount".to_string(), request.page_size.to_string()),
        ("resultOffset".to_string(), offset.to_string()),
    ];

    if let Some(spatial) = spatial {
        params.push(("geometry".to_string(), spatial.geometry_json()));
        params.push(("geometryType".to_string(), POINT_GEOMETRY_TYPE.to_string()));
        params.push(("distance".to_string(), spatial.distance_miles.to_string()));
        params.push(("units".to_string(), DISTANCE_UNITS.to_string()));
        params.push((
            "spatialRel".to_string(),
            spatial.relationship.as_str().to_string(),
        ));
    }

    params
}

fn split_fields(fields: &str) -> Vec<String> {
    let parsed: Vec<String> = fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect();
    if parsed.is_empty() {
        vec!["*".to_string()]
    } else {
        parsed
    }
}
