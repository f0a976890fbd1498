use geoquery_core::{Feature, FeatureCollection, Geometry};
use serde_json::{json, Value};

/// Render a collection as a GeoJSON `FeatureCollection`.
///
/// Coordinates are passed through untouched, so the output is only valid
/// GeoJSON when the query ran in WGS84.
pub fn to_geojson(collection: &FeatureCollection) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": collection.features.iter().map(feature_to_geojson).collect::<Vec<_>>(),
    })
}

pub fn feature_to_geojson(feature: &Feature) -> Value {
    let mut value = json!({
        "type": "Feature",
        "properties": Value::Object(feature.attributes.clone()),
        "geometry": feature.geometry.as_ref().map(geometry_to_geojson).unwrap_or(Value::Null),
    });
    if let Some(id) = feature.id() {
        value["id"] = json!(id);
    }
    value
}

fn geometry_to_geojson(geometry: &Geometry) -> Value {
    match geometry {
        Geometry::Point { x, y } => json!({"type": "Point", "coordinates": [x, y]}),
        Geometry::Polygon { rings } => json!({"type": "Polygon", "coordinates": rings}),
        Geometry::Polyline { paths } if paths.len() == 1 => {
            json!({"type": "LineString", "coordinates": paths[0]})
        }
        Geometry::Polyline { paths } => json!({"type": "MultiLineString", "coordinates": paths}),
        Geometry::Other(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn feature(id: i64, geometry: Option<Geometry>) -> Feature {
        let mut attributes = Map::new();
        attributes.insert("OBJECTID".into(), json!(id));
        attributes.insert("NAME".into(), json!("Travis"));
        Feature {
            attributes,
            geometry,
        }
    }

    #[test]
    fn test_point_feature() {
        let collection = FeatureCollection {
            features: vec![feature(3, Some(Geometry::Point { x: -97.7, y: 30.2 }))],
            ..Default::default()
        };
        let geojson = to_geojson(&collection);

        assert_eq!(geojson["type"], "FeatureCollection");
        let first = &geojson["features"][0];
        assert_eq!(first["id"], 3);
        assert_eq!(first["geometry"]["type"], "Point");
        assert_eq!(first["geometry"]["coordinates"][0], -97.7);
        assert_eq!(first["properties"]["NAME"], "Travis");
    }

    #[test]
    fn test_polyline_shapes() {
        let single = geometry_to_geojson(&Geometry::Polyline {
            paths: vec![vec![[0.0, 0.0], [1.0, 1.0]]],
        });
        assert_eq!(single["type"], "LineString");

        let multi = geometry_to_geojson(&Geometry::Polyline {
            paths: vec![vec![[0.0, 0.0]], vec![[2.0, 2.0]]],
        });
        assert_eq!(multi["type"], "MultiLineString");
    }

    #[test]
    fn test_missing_geometry_is_null() {
        let value = feature_to_geojson(&feature(1, None));
        assert!(value["geometry"].is_null());
    }
}
