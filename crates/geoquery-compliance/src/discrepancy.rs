use crate::compliance::{round2, AREA_FIELD, NAME_FIELD, STATE_FIELD};
use geoquery_core::{Feature, GeoQueryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_TOLERANCE_PERCENT: f64 = 1.0;

/// Reference areas keyed by normalized `(name, state)`.
pub type ReferenceAreas = HashMap<(String, String), f64>;

fn reference_key(name: &str, state: &str) -> (String, String) {
    (name.trim().to_lowercase(), state.trim().to_lowercase())
}

/// Source of trusted area values to compare feature areas against.
pub trait ReferenceAreaStore: Send + Sync {
    fn load(&self) -> Result<ReferenceAreas>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub sqmi: f64,
}

impl ReferenceRow {
    pub fn new(name: impl Into<String>, state: Option<&str>, sqmi: f64) -> Self {
        Self {
            name: name.into(),
            state: state.map(str::to_string),
            sqmi,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceAreas {
    areas: ReferenceAreas,
}

impl InMemoryReferenceAreas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: &[ReferenceRow]) -> Self {
        let mut store = Self::new();
        for row in rows {
            store.insert(&row.name, row.state.as_deref().unwrap_or(""), row.sqmi);
        }
        store
    }

    pub fn insert(&mut self, name: &str, state: &str, sqmi: f64) {
        self.areas.insert(reference_key(name, state), sqmi);
    }
}

impl ReferenceAreaStore for InMemoryReferenceAreas {
    fn load(&self) -> Result<ReferenceAreas> {
        Ok(self.areas.clone())
    }
}

/// Reference table kept as a JSON array of rows on disk.
#[derive(Debug, Clone)]
pub struct JsonReferenceFile {
    path: PathBuf,
}

impl JsonReferenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file's contents with `rows`.
    ///
    /// Rows are checked before anything is written: the list must be
    /// non-empty, every row needs a name and `sqmi` must be a number.
    pub fn seed(&self, rows: &[Value]) -> Result<usize> {
        if rows.is_empty() {
            return Err(GeoQueryError::validation(
                "reference rows must be a non-empty list",
            ));
        }

        let mut parsed = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| {
                    GeoQueryError::validation("each reference row must include a name")
                })?;
            let sqmi = match row.get("sqmi") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| {
                GeoQueryError::validation(format!("invalid sqmi value for '{}'", name))
            })?;
            let state = row
                .get("state")
                .and_then(Value::as_str)
                .filter(|state| !state.is_empty());
            parsed.push(ReferenceRow::new(name, state, sqmi));
        }

        let json = serde_json::to_string_pretty(&parsed).map_err(|e| {
            GeoQueryError::validation(format!("failed to encode reference rows: {}", e))
        })?;
        std::fs::write(&self.path, json).map_err(|e| {
            GeoQueryError::connection(format!(
                "failed to write reference file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!(
            rows = parsed.len(),
            path = %self.path.display(),
            "Seeded reference areas"
        );
        Ok(parsed.len())
    }
}

impl ReferenceAreaStore for JsonReferenceFile {
    fn load(&self) -> Result<ReferenceAreas> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            GeoQueryError::connection(format!(
                "unable to read reference file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let rows: Vec<Value> = serde_json::from_str(&raw).map_err(|e| {
            GeoQueryError::validation(format!(
                "reference file {} is not a JSON array: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut areas = ReferenceAreas::with_capacity(rows.len());
        for row in rows {
            let Some(name) = row.get("name").and_then(Value::as_str) else {
                continue;
            };
            let state = row.get("state").and_then(Value::as_str).unwrap_or("");
            match row.get("sqmi").and_then(Value::as_f64) {
                Some(sqmi) => {
                    areas.insert(reference_key(name, state), sqmi);
                }
                None => warn!(name, state, "Skipping reference row with invalid sqmi"),
            }
        }
        debug!(rows = areas.len(), path = %self.path.display(), "Loaded reference areas");
        Ok(areas)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscrepancyDetail {
    pub name: String,
    pub state: Option<String>,
    pub gis_sq_miles: f64,
    pub reference_sq_miles: f64,
    pub difference_sq_miles: f64,
    pub percent_difference: f64,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DiscrepancyReport {
    pub tolerance_percent: f64,
    pub compared: usize,
    pub flagged_count: usize,
    pub matching_count: usize,
    pub invalid_features: usize,
    pub missing_in_reference: Vec<String>,
    pub discrepancies: Vec<DiscrepancyDetail>,
    pub matches: Vec<DiscrepancyDetail>,
}

/// Compare each feature's `SQMI` against the reference store and flag
/// features whose percent difference exceeds `tolerance_percent`.
pub fn detect_area_discrepancies(
    features: &[Feature],
    store: &dyn ReferenceAreaStore,
    tolerance_percent: f64,
) -> Result<DiscrepancyReport> {
    if !tolerance_percent.is_finite() || tolerance_percent < 0.0 {
        return Err(GeoQueryError::validation(
            "tolerance_percent must be non-negative",
        ));
    }

    let reference = store.load()?;
    let mut report = DiscrepancyReport {
        tolerance_percent,
        ..Default::default()
    };

    for feature in features {
        let name = feature
            .string_attribute(NAME_FIELD)
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let state = feature.string_attribute(STATE_FIELD).unwrap_or("");

        let Some(gis_sqmi) = feature
            .numeric_attribute(AREA_FIELD)
            .filter(|area| area.is_finite())
        else {
            report.invalid_features += 1;
            warn!(county_name = ?name, state, "Invalid GIS area encountered");
            continue;
        };
        let Some(name) = name else {
            report.invalid_features += 1;
            warn!(state, "Missing county name on GIS feature");
            continue;
        };

        let Some(&reference_sqmi) = reference.get(&reference_key(name, state)) else {
            report.missing_in_reference.push(name.to_string());
            debug!(county_name = name, state, "Feature not found in reference areas");
            continue;
        };
        report.compared += 1;

        if reference_sqmi == 0.0 {
            report.invalid_features += 1;
            warn!(county_name = name, state, "Reference area is zero; skipping comparison");
            continue;
        }

        let difference = gis_sqmi - reference_sqmi;
        let percent = difference / reference_sqmi * 100.0;
        let detail = DiscrepancyDetail {
            name: name.to_string(),
            state: (!state.is_empty()).then(|| state.to_string()),
            gis_sq_miles: round2(gis_sqmi),
            reference_sq_miles: round2(reference_sqmi),
            difference_sq_miles: round2(difference),
            percent_difference: round2(percent),
            status: if difference > 0.0 { "GIS higher" } else { "GIS lower" },
        };

        if percent.abs() > tolerance_percent {
            info!(
                county_name = name,
                state,
                percent_difference = detail.percent_difference,
                tolerance_percent,
                "Discrepancy detected"
            );
            report.flagged_count += 1;
            report.discrepancies.push(detail);
        } else {
            report.matching_count += 1;
            report.matches.push(detail);
        }
    }

    Ok(report)
}
