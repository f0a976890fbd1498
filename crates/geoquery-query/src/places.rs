use geoquery_core::{GeoPoint, GeoQueryError, Result};
use tracing::debug;

/// Known city centers (longitude, latitude in WGS84).
pub const KNOWN_PLACES: &[(&str, GeoPoint)] = &[
    ("austin, texas", GeoPoint::new(-97.7431, 30.2672)),
    ("houston, texas", GeoPoint::new(-95.3698, 29.7604)),
    ("dallas, texas", GeoPoint::new(-96.7970, 32.7767)),
    ("san antonio, texas", GeoPoint::new(-98.4936, 29.4241)),
    ("los angeles, california", GeoPoint::new(-118.2437, 34.0522)),
    ("san francisco, california", GeoPoint::new(-122.4194, 37.7749)),
    ("new york, new york", GeoPoint::new(-74.0060, 40.7128)),
    ("chicago, illinois", GeoPoint::new(-87.6298, 41.8781)),
    ("phoenix, arizona", GeoPoint::new(-112.0740, 33.4484)),
    ("philadelphia, pennsylvania", GeoPoint::new(-75.1652, 39.9526)),
];

/// Resolves place names to coordinates from a fixed table. No geocoder is consulted.
#[derive(Debug, Clone)]
pub struct PlaceResolver {
    places: Vec<(String, GeoPoint)>,
}

impl Default for PlaceResolver {
    fn default() -> Self {
        Self {
            places: KNOWN_PLACES
                .iter()
                .map(|(name, point)| (name.to_string(), *point))
                .collect(),
        }
    }
}

impl PlaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a place.
    pub fn with_place(mut self, name: &str, point: GeoPoint) -> Self {
        let key = normalize(name);
        self.places.retain(|(existing, _)| *existing != key);
        self.places.push((key, point));
        self
    }

    pub fn known_places(&self) -> impl Iterator<Item = &str> {
        self.places.iter().map(|(name, _)| name.as_str())
    }

    /// Exact (case-insensitive) match first, then the first table entry
    /// whose whole city name appears as words in the input, so "Austin TX"
    /// resolves while fragments like "Texas" or "new" do not.
    pub fn resolve(&self, place: &str) -> Result<GeoPoint> {
        let key = normalize(place);
        if key.is_empty() {
            return Err(GeoQueryError::validation("Place name cannot be empty"));
        }

        if let Some((_, point)) = self.places.iter().find(|(name, _)| *name == key) {
            return Ok(*point);
        }

        if let Some((name, point)) = self
            .places
            .iter()
            .find(|(name, _)| contains_words(&key, city_of(name)))
        {
            debug!(place, matched = %name, "Resolved place by partial match");
            return Ok(*point);
        }

        Err(GeoQueryError::validation(format!(
            "Unknown location '{}'. Known places: {}",
            place,
            self.known_places().collect::<Vec<_>>().join("; ")
        )))
    }
}

fn city_of(name: &str) -> &str {
    name.split(',').next().unwrap_or(name).trim()
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// True when `needle`'s words occur as a contiguous run in `haystack`.
fn contains_words(haystack: &str, needle: &str) -> bool {
    let needle = words(needle);
    !needle.is_empty() && words(haystack).windows(needle.len()).any(|w| w == needle.as_slice())
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
