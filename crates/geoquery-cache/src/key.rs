use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Decimal places kept when a float takes part in a cache key.
const FLOAT_PRECISION: usize = 6;

/// Builds deterministic cache keys from named request parameters.
///
/// Parameters are kept in a sorted map, so insertion order never matters,
/// and floats are rendered at fixed precision so `50`, `50.0` and
/// `50.0000001` collapse to the same key.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: &'static str,
    parts: BTreeMap<&'static str, String>,
}

impl CacheKeyBuilder {
    pub fn new(namespace: &'static str) -> Self {
        Self {
            namespace,
            parts: BTreeMap::new(),
        }
    }

    pub fn text(mut self, name: &'static str, value: impl AsRef<str>) -> Self {
        self.parts.insert(name, value.as_ref().to_string());
        self
    }

    /// Lowercased with runs of whitespace collapsed to one space.
    pub fn normalized_text(mut self, name: &'static str, value: impl AsRef<str>) -> Self {
        self.parts.insert(name, normalize_text(value.as_ref()));
        self
    }

    pub fn number(mut self, name: &'static str, value: impl ToString) -> Self {
        self.parts.insert(name, value.to_string());
        self
    }

    pub fn float(mut self, name: &'static str, value: f64) -> Self {
        self.parts.insert(name, format_float(value));
        self
    }

    pub fn flag(mut self, name: &'static str, value: bool) -> Self {
        self.parts.insert(name, value.to_string());
        self
    }

    pub fn optional<T: ToString>(mut self, name: &'static str, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.parts.insert(name, value.to_string());
        }
        self
    }

    /// Canonical pre-hash form, useful in logs and tests.
    pub fn canonical(&self) -> String {
        self.parts
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn build(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        format!("{}_{:x}", self.namespace, hasher.finalize())
    }
}

pub fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn format_float(value: f64) -> String {
    let rendered = format!("{:.*}", FLOAT_PRECISION, value);
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_order_does_not_matter() {
        let a = CacheKeyBuilder::new("q")
            .text("where", "1=1")
            .number("page_size", 100)
            .build();
        let b = CacheKeyBuilder::new("q")
            .number("page_size", 100)
            .text("where", "1=1")
            .build();
        assert_eq!(a, b);
        assert!(a.starts_with("q_"));
    }

    #[test]
    fn test_float_normalization() {
        assert_eq!(format_float(50.0), "50");
        assert_eq!(format_float(-97.7431), "-97.7431");
        assert_eq!(format_float(0.1 + 0.2), "0.3");
        assert_eq!(format_float(-0.0), "0");

        let a = CacheKeyBuilder::new("q").float("distance", 50.0).build();
        let b = CacheKeyBuilder::new("q").float("distance", 50.0000001).build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalized_text() {
        let a = CacheKeyBuilder::new("nl")
            .normalized_text("query", "  Counties in   TEXAS ")
            .build();
        let b = CacheKeyBuilder::new("nl")
            .normalized_text("query", "counties in texas")
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_values_distinct_keys() {
        let a = CacheKeyBuilder::new("q").number("offset", 0).build();
        let b = CacheKeyBuilder::new("q").number("offset", 1000).build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_optional_absent_is_omitted() {
        let builder = CacheKeyBuilder::new("q")
            .text("where", "1=1")
            .optional::<u32>("max", None);
        assert_eq!(builder.canonical(), "where=1=1");
    }
}
