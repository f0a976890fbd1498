use approx::assert_relative_eq;
use geoquery_compliance::{
    analyze_lease_compliance, check_area_compliance, generate_shortfall_report,
    LeaseRecommendation, DEFAULT_LEASE_MIN_AREA,
};
use geoquery_core::{ErrorKind, Feature, Geometry};
use serde_json::{json, Value};

fn county(name: &str, sqmi: Value) -> Feature {
    let attributes = json!({
        "NAME": name,
        "STATE_NAME": "Texas",
        "SQMI": sqmi,
        "POPULATION": 1000
    });
    match attributes {
        Value::Object(map) => Feature::new(map),
        _ => unreachable!(),
    }
}

fn sample() -> Vec<Feature> {
    vec![
        county("Brewster", json!(6193.0)),
        county("Travis", json!(1023.0)),
        county("Pecos", json!(4765.0)),
        county("Rockwall", json!(149.0)),
        county("Hudspeth", json!(2340.0)),
        county("Nowhere", Value::Null),
        county("Broken", json!("n/a")),
    ]
}

#[test]
fn test_area_compliance_counts() {
    let report = check_area_compliance(&sample(), 2000.0).unwrap();

    assert_eq!(report.total_checked, 5);
    assert_eq!(report.compliant_count, 3);
    assert_eq!(report.non_compliant_count, 2);
    assert_eq!(report.invalid_features, 2);
    assert_eq!(report.details.len(), 7);

    let travis = report.details.iter().find(|d| d.name == "Travis").unwrap();
    assert!(!travis.compliant);
    assert_relative_eq!(travis.shortfall, 977.0);
    assert_eq!(
        travis.recommendation,
        "Consider consolidation with adjacent counties"
    );

    let broken = report.details.iter().find(|d| d.name == "Broken").unwrap();
    assert!(broken.area.is_none());
    assert_eq!(broken.note.as_deref(), Some("Invalid or missing SQMI value"));
}

#[test]
fn test_boundary_area_is_compliant() {
    let report = check_area_compliance(&[county("Exact", json!(2000))], 2000.0).unwrap();
    assert_eq!(report.compliant_count, 1);
    assert_relative_eq!(report.details[0].shortfall, 0.0);
}

#[test]
fn test_numeric_string_area_is_accepted() {
    let report = check_area_compliance(&[county("Stringly", json!("2500.5"))], 2000.0).unwrap();
    assert_eq!(report.total_checked, 1);
    assert_eq!(report.invalid_features, 0);
}

#[test]
fn test_shortfall_report_orders_by_largest_shortfall() {
    let report = generate_shortfall_report(&sample(), 2500.0).unwrap();
    let names: Vec<&str> = report
        .non_compliant_details
        .iter()
        .map(|d| d.name.as_str())
        .collect();

    assert_eq!(names, vec!["Rockwall", "Travis", "Hudspeth"]);
    assert_relative_eq!(report.non_compliant_details[0].shortfall_sq_miles, 2351.0);
    assert_eq!(report.report.non_compliant_count, 3);
}

#[test]
fn test_non_positive_minimum_is_rejected() {
    let err = check_area_compliance(&sample(), 0.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_lease_analysis_summary() {
    let report = analyze_lease_compliance(&sample(), DEFAULT_LEASE_MIN_AREA, false).unwrap();
    let summary = &report.summary;

    assert_eq!(summary.total_counties_analyzed, 5);
    assert_eq!(summary.compliant_count, 2);
    assert_eq!(summary.non_compliant_count, 3);
    assert_eq!(summary.invalid_count, 2);
    assert_relative_eq!(summary.compliance_rate_percentage, 40.0);
    // 1477 + 2351 + 160
    assert_relative_eq!(summary.total_shortfall_sq_miles, 3988.0);
    assert_relative_eq!(summary.average_shortfall_sq_miles, 1329.33);

    // Compliant counties are only listed when geometry is requested.
    assert!(report.compliant_counties.is_empty());
    assert!(!report.metadata.include_geometry);
    assert!(report.metadata.policy.contains("2500"));
}

#[test]
fn test_lease_recommendations_follow_coverage() {
    let report = analyze_lease_compliance(&sample(), DEFAULT_LEASE_MIN_AREA, false).unwrap();
    let by_name = |name: &str| {
        report
            .non_compliant_counties
            .iter()
            .find(|c| c.county_name == name)
            .unwrap()
    };

    let hudspeth = by_name("Hudspeth");
    assert_relative_eq!(hudspeth.compliance_percentage.unwrap(), 93.6);
    assert_eq!(
        hudspeth.recommendation.as_deref(),
        Some(LeaseRecommendation::SpecialTerms.message())
    );

    let travis = by_name("Travis");
    assert_relative_eq!(travis.compliance_percentage.unwrap(), 40.92);
    assert_eq!(
        travis.recommendation.as_deref(),
        Some(LeaseRecommendation::AlternativeStructure.message())
    );

    assert_eq!(report.non_compliant_counties[0].county_name, "Rockwall");
}

#[test]
fn test_lease_geometry_included_on_request() {
    let features = vec![
        county("Big", json!(3000.0)).with_geometry(Geometry::Point { x: -100.0, y: 31.0 }),
        county("Small", json!(10.0)).with_geometry(Geometry::Point { x: -97.0, y: 30.0 }),
    ];

    let report = analyze_lease_compliance(&features, DEFAULT_LEASE_MIN_AREA, true).unwrap();
    assert_eq!(report.compliant_counties.len(), 1);
    assert_relative_eq!(report.compliant_counties[0].excess_area.unwrap(), 500.0);
    assert!(report.compliant_counties[0].geometry.is_some());
    assert!(report.non_compliant_counties[0].geometry.is_some());

    let without = analyze_lease_compliance(&features, DEFAULT_LEASE_MIN_AREA, false).unwrap();
    assert!(without.non_compliant_counties[0].geometry.is_none());
}

#[test]
fn test_empty_input_has_zero_rates() {
    let report = analyze_lease_compliance(&[], DEFAULT_LEASE_MIN_AREA, false).unwrap();
    assert_eq!(report.summary.total_counties_analyzed, 0);
    assert_relative_eq!(report.summary.compliance_rate_percentage, 0.0);
    assert_relative_eq!(report.summary.average_shortfall_sq_miles, 0.0);
}
