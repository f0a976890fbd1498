use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Attribute names ArcGIS layers commonly use for the object identifier.
const ID_FIELDS: &[&str] = &["OBJECTID", "FID", "ObjectId", "objectid"];

/// A longitude/latitude pair in the configured spatial reference (WGS84 by default).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
}

impl GeoPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// ArcGIS JSON geometry. Unrecognized shapes are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Geometry {
    Point {
        x: f64,
        y: f64,
    },
    Polygon {
        rings: Vec<Vec<[f64; 2]>>,
    },
    Polyline {
        paths: Vec<Vec<[f64; 2]>>,
    },
    Other(Value),
}

/// One geospatial record as returned by a feature service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Stable object identifier, if the layer exposes one.
    pub fn id(&self) -> Option<i64> {
        ID_FIELDS
            .iter()
            .find_map(|name| self.attributes.get(*name).and_then(Value::as_i64))
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute value coerced to a number. Numeric strings are accepted.
    pub fn numeric_attribute(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_wkid: Option<u32>,
}

/// Field descriptor from the service's `fields` metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl FieldDescriptor {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.field_type.as_str(),
            "esriFieldTypeSmallInteger"
                | "esriFieldTypeInteger"
                | "esriFieldTypeBigInteger"
                | "esriFieldTypeSingle"
                | "esriFieldTypeDouble"
                | "esriFieldTypeOID"
        )
    }
}

/// Ordered features plus pass-through metadata copied from the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    /// Number of page requests issued (cache hits included).
    #[serde(default)]
    pub pages_fetched: usize,
    /// Set when the page cap stopped a query that still reported more data.
    #[serde(default)]
    pub max_pages_reached: bool,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether `name` is known either from the schema or from any feature's attributes.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
            || self
                .features
                .iter()
                .any(|feature| feature.attributes.contains_key(name))
    }

    /// A field is numeric if the schema says so or, without a schema entry,
    /// when every non-null value is a JSON number.
    pub fn is_numeric_field(&self, name: &str) -> bool {
        if let Some(descriptor) = self.field(name) {
            return descriptor.is_numeric();
        }
        let mut saw_value = false;
        for value in self.features.iter().filter_map(|f| f.attribute(name)) {
            match value {
                Value::Null => continue,
                Value::Number(_) => saw_value = true,
                _ => return false,
            }
        }
        saw_value
    }

    pub fn is_partial(&self) -> bool {
        self.max_pages_reached
    }
}
