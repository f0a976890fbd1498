//! Reference data for the USA Census Counties layer: the synonyms the
//! translator teaches the model, and worked query examples.

use serde::Serialize;
use std::collections::BTreeMap;

pub const DATASET_NAME: &str = "USA Census Counties";

/// Natural-language synonym to canonical field name.
pub const FIELD_MAPPINGS: &[(&str, &str)] = &[
    ("state", "STATE_NAME"),
    ("state name", "STATE_NAME"),
    ("county", "NAME"),
    ("county name", "NAME"),
    ("area", "SQMI"),
    ("square miles", "SQMI"),
    ("sq miles", "SQMI"),
    ("sqmi", "SQMI"),
    ("population", "POPULATION"),
    ("pop", "POPULATION"),
    ("fips", "FIPS"),
    ("state fips", "STATE_FIPS"),
];

/// A worked natural-language to filter example.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExampleQuery {
    pub natural_language: &'static str,
    pub where_clause: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<&'static str>,
    /// Place name and radius in miles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<(&'static str, f64)>,
    pub description: &'static str,
}

impl ExampleQuery {
    const fn filter(
        natural_language: &'static str,
        where_clause: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            natural_language,
            where_clause,
            order_by: None,
            limit: None,
            aggregation: None,
            spatial_filter: None,
            description,
        }
    }
}

pub const EXAMPLE_QUERIES: &[ExampleQuery] = &[
    ExampleQuery::filter(
        "find counties in Texas under 2500 square miles",
        "STATE_NAME = 'Texas' AND SQMI < 2500",
        "Filter by state and area threshold",
    ),
    ExampleQuery {
        order_by: Some("SQMI DESC"),
        limit: Some(5),
        ..ExampleQuery::filter(
            "top 5 largest counties in Texas",
            "STATE_NAME = 'Texas'",
            "Top N query with ORDER BY and LIMIT",
        )
    },
    ExampleQuery::filter(
        "counties in California with population over 1 million",
        "STATE_NAME = 'California' AND POPULATION > 1000000",
        "Combine state filter with population criteria",
    ),
    ExampleQuery {
        aggregation: Some("COUNT"),
        ..ExampleQuery::filter(
            "how many counties are in Texas",
            "STATE_NAME = 'Texas'",
            "Count aggregation query",
        )
    },
    ExampleQuery {
        spatial_filter: Some(("Austin, Texas", 50.0)),
        ..ExampleQuery::filter(
            "counties near Austin Texas within 50 miles",
            "1=1",
            "Spatial proximity query",
        )
    },
    ExampleQuery::filter(
        "show me counties in Texas or Oklahoma",
        "STATE_NAME IN ('Texas', 'Oklahoma')",
        "Multiple state selection with OR logic",
    ),
    ExampleQuery {
        order_by: Some("SQMI ASC"),
        limit: Some(3),
        ..ExampleQuery::filter(
            "smallest 3 counties in California",
            "STATE_NAME = 'California'",
            "Bottom N query with ascending order",
        )
    },
    ExampleQuery::filter(
        "counties in Texas between 1000 and 3000 square miles",
        "STATE_NAME = 'Texas' AND SQMI >= 1000 AND SQMI <= 3000",
        "Range query with multiple conditions",
    ),
];

pub fn field_mappings() -> BTreeMap<&'static str, &'static str> {
    FIELD_MAPPINGS.iter().copied().collect()
}

/// Canonical field names, deduplicated.
pub fn canonical_fields() -> Vec<&'static str> {
    let mut fields: Vec<_> = FIELD_MAPPINGS.iter().map(|(_, field)| *field).collect();
    fields.sort_unstable();
    fields.dedup();
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_resolve() {
        let mappings = field_mappings();
        assert_eq!(mappings["square miles"], "SQMI");
        assert_eq!(mappings["state"], "STATE_NAME");
        assert_eq!(mappings.len(), FIELD_MAPPINGS.len());
    }

    #[test]
    fn test_examples_only_use_known_fields() {
        let fields = canonical_fields();
        for example in EXAMPLE_QUERIES {
            if let Some(order_by) = example.order_by {
                let field = order_by.split_whitespace().next().unwrap();
                assert!(fields.contains(&field), "{}", example.natural_language);
            }
        }
    }
}
