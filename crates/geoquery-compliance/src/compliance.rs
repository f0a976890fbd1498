use chrono::Utc;
use geoquery_core::{Feature, GeoQueryError, Geometry, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

pub const AREA_FIELD: &str = "SQMI";
pub const NAME_FIELD: &str = "NAME";
pub const STATE_FIELD: &str = "STATE_NAME";
pub const POPULATION_FIELD: &str = "POPULATION";
pub const DEFAULT_LEASE_MIN_AREA: f64 = 2500.0;

const UNKNOWN: &str = "Unknown";
const CONSOLIDATION_HINT: &str = "Consider consolidation with adjacent counties";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceDetail {
    pub name: String,
    pub area: Option<f64>,
    pub required: f64,
    pub compliant: bool,
    pub shortfall: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComplianceReport {
    /// Features with a usable area value
    pub total_checked: usize,
    pub compliant_count: usize,
    pub non_compliant_count: usize,
    pub invalid_features: usize,
    pub details: Vec<ComplianceDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortfallDetail {
    pub name: String,
    pub area_sq_miles: f64,
    pub required_sq_miles: f64,
    pub shortfall_sq_miles: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortfallReport {
    #[serde(flatten)]
    pub report: ComplianceReport,
    /// Non-compliant features, largest shortfall first
    pub non_compliant_details: Vec<ShortfallDetail>,
}

fn validate_min_area(min_area_sq_miles: f64) -> Result<()> {
    if !min_area_sq_miles.is_finite() || min_area_sq_miles <= 0.0 {
        return Err(GeoQueryError::validation(
            "min_area_sq_miles must be greater than zero",
        ));
    }
    Ok(())
}

fn area_of(feature: &Feature) -> Option<f64> {
    feature
        .numeric_attribute(AREA_FIELD)
        .filter(|area| area.is_finite())
}

fn name_of(feature: &Feature) -> String {
    feature
        .string_attribute(NAME_FIELD)
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Check every feature's `SQMI` against `min_area_sq_miles`.
///
/// Features whose area is missing or not numeric are counted as invalid and
/// listed with a note; they do not count toward `total_checked`.
pub fn check_area_compliance(features: &[Feature], min_area_sq_miles: f64) -> Result<ComplianceReport> {
    validate_min_area(min_area_sq_miles)?;
    info!(
        feature_count = features.len(),
        min_area_sq_miles, "Starting compliance check"
    );

    let mut report = ComplianceReport::default();
    for feature in features {
        let name = name_of(feature);
        let Some(area) = area_of(feature) else {
            report.invalid_features += 1;
            report.details.push(ComplianceDetail {
                name,
                area: None,
                required: min_area_sq_miles,
                compliant: false,
                shortfall: 0.0,
                recommendation: String::new(),
                note: Some("Invalid or missing SQMI value".to_string()),
            });
            continue;
        };

        report.total_checked += 1;
        let compliant = area >= min_area_sq_miles;
        if compliant {
            report.compliant_count += 1;
        } else {
            report.non_compliant_count += 1;
        }
        report.details.push(ComplianceDetail {
            name,
            area: Some(area),
            required: min_area_sq_miles,
            compliant,
            shortfall: if compliant { 0.0 } else { min_area_sq_miles - area },
            recommendation: if compliant {
                String::new()
            } else {
                CONSOLIDATION_HINT.to_string()
            },
            note: None,
        });
    }

    info!(
        total_checked = report.total_checked,
        compliant_count = report.compliant_count,
        non_compliant_count = report.non_compliant_count,
        invalid_features = report.invalid_features,
        "Compliance check completed"
    );
    Ok(report)
}

pub fn generate_shortfall_report(features: &[Feature], min_area_sq_miles: f64) -> Result<ShortfallReport> {
    let report = check_area_compliance(features, min_area_sq_miles)?;

    let mut non_compliant_details: Vec<ShortfallDetail> = report
        .details
        .iter()
        .filter(|d| !d.compliant)
        .filter_map(|d| {
            d.area.map(|area| ShortfallDetail {
                name: d.name.clone(),
                area_sq_miles: area,
                required_sq_miles: min_area_sq_miles,
                shortfall_sq_miles: d.shortfall,
                recommendation: d.recommendation.clone(),
            })
        })
        .collect();
    non_compliant_details.sort_by(|a, b| b.shortfall_sq_miles.total_cmp(&a.shortfall_sq_miles));

    Ok(ShortfallReport {
        report,
        non_compliant_details,
    })
}

/// Recommendation tier by how much of the required area a tract covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseRecommendation {
    /// At least 90% of the requirement
    SpecialTerms,
    /// 75% to 90%
    CombineTracts,
    /// 50% to 75%
    Pooling,
    /// Below 50%
    AlternativeStructure,
}

impl LeaseRecommendation {
    pub fn for_coverage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            LeaseRecommendation::SpecialTerms
        } else if percentage >= 75.0 {
            LeaseRecommendation::CombineTracts
        } else if percentage >= 50.0 {
            LeaseRecommendation::Pooling
        } else {
            LeaseRecommendation::AlternativeStructure
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            LeaseRecommendation::SpecialTerms => {
                "Consider special terms negotiation - minor shortfall"
            }
            LeaseRecommendation::CombineTracts => {
                "Combine with adjacent tracts or apply for non-standard terms"
            }
            LeaseRecommendation::Pooling => {
                "Significant consolidation required - consider pooling agreement"
            }
            LeaseRecommendation::AlternativeStructure => {
                "Does not meet minimum requirements - alternative lease structure needed"
            }
        }
    }
}

impl fmt::Display for LeaseRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyLease {
    pub county_name: String,
    pub state: String,
    pub area_sq_miles: f64,
    pub required_sq_miles: f64,
    pub compliant: bool,
    pub population: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excess_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall_sq_miles: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseSummary {
    pub total_counties_analyzed: usize,
    pub compliant_count: usize,
    pub non_compliant_count: usize,
    pub invalid_count: usize,
    pub compliance_rate_percentage: f64,
    pub total_shortfall_sq_miles: f64,
    pub average_shortfall_sq_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseMetadata {
    pub policy: String,
    pub minimum_area_requirement_sq_miles: f64,
    /// RFC 3339, UTC
    pub analysis_timestamp: String,
    pub include_geometry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseComplianceReport {
    pub summary: LeaseSummary,
    /// Largest shortfall first
    pub non_compliant_counties: Vec<CountyLease>,
    /// Populated only when geometry is requested
    pub compliant_counties: Vec<CountyLease>,
    pub metadata: LeaseMetadata,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rank counties below the lease minimum by shortfall and summarize coverage.
pub fn analyze_lease_compliance(
    features: &[Feature],
    min_area_sq_miles: f64,
    include_geometry: bool,
) -> Result<LeaseComplianceReport> {
    validate_min_area(min_area_sq_miles)?;
    info!(
        feature_count = features.len(),
        min_area_sq_miles, "Starting lease compliance analysis"
    );

    let mut compliant_counties = Vec::new();
    let mut non_compliant_counties = Vec::new();
    let mut invalid_count = 0usize;
    let mut total_shortfall = 0.0;

    for feature in features {
        let county_name = name_of(feature);
        let state = feature
            .string_attribute(STATE_FIELD)
            .unwrap_or(UNKNOWN)
            .to_string();

        let Some(area) = area_of(feature) else {
            invalid_count += 1;
            warn!(county = %county_name, state = %state, "Invalid area value for county");
            continue;
        };

        let compliant = area >= min_area_sq_miles;
        let mut county = CountyLease {
            county_name,
            state,
            area_sq_miles: round2(area),
            required_sq_miles: min_area_sq_miles,
            compliant,
            population: feature
                .attribute(POPULATION_FIELD)
                .cloned()
                .unwrap_or(Value::Null),
            excess_area: None,
            shortfall_sq_miles: None,
            compliance_percentage: None,
            recommendation: None,
            geometry: feature.geometry.clone().filter(|_| include_geometry),
        };

        if compliant {
            county.excess_area = Some(round2(area - min_area_sq_miles));
            compliant_counties.push(county);
        } else {
            let shortfall = min_area_sq_miles - area;
            let coverage = area / min_area_sq_miles * 100.0;
            county.shortfall_sq_miles = Some(round2(shortfall));
            county.compliance_percentage = Some(round2(coverage));
            county.recommendation = Some(LeaseRecommendation::for_coverage(coverage).to_string());
            total_shortfall += shortfall;
            non_compliant_counties.push(county);
        }
    }

    non_compliant_counties.sort_by(|a, b| {
        b.shortfall_sq_miles
            .unwrap_or(0.0)
            .total_cmp(&a.shortfall_sq_miles.unwrap_or(0.0))
    });

    let analyzed = features.len() - invalid_count;
    let summary = LeaseSummary {
        total_counties_analyzed: analyzed,
        compliant_count: compliant_counties.len(),
        non_compliant_count: non_compliant_counties.len(),
        invalid_count,
        compliance_rate_percentage: if analyzed > 0 {
            round2(compliant_counties.len() as f64 / analyzed as f64 * 100.0)
        } else {
            0.0
        },
        total_shortfall_sq_miles: round2(total_shortfall),
        average_shortfall_sq_miles: if non_compliant_counties.is_empty() {
            0.0
        } else {
            round2(total_shortfall / non_compliant_counties.len() as f64)
        },
    };

    info!(
        total_analyzed = summary.total_counties_analyzed,
        compliant = summary.compliant_count,
        non_compliant = summary.non_compliant_count,
        compliance_rate = summary.compliance_rate_percentage,
        "Lease compliance analysis completed"
    );

    Ok(LeaseComplianceReport {
        summary,
        non_compliant_counties,
        compliant_counties: if include_geometry {
            compliant_counties
        } else {
            Vec::new()
        },
        metadata: LeaseMetadata {
            policy: format!(
                "All leases must be at least {} square miles to qualify for standard terms",
                min_area_sq_miles
            ),
            minimum_area_requirement_sq_miles: min_area_sq_miles,
            analysis_timestamp: Utc::now().to_rfc3339(),
            include_geometry,
        },
    })
}
