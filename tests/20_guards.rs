mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::http::Method;
use serde_json::json;

use school_scope_api::scope::{
    Dimension, DimensionSource, IsolationGuard, MemoryViolationReporter, ModuleType, ScopeError, ViolationKind,
};

fn guards() -> (IsolationGuard, IsolationGuard, Arc<MemoryViolationReporter>) {
    let reporter = Arc::new(MemoryViolationReporter::new());
    let level = IsolationGuard::school_level(common::extractor(), reporter.clone(), ModuleType::Overview);
    let year = IsolationGuard::academic_year(common::extractor(), reporter.clone(), ModuleType::Overview);
    (level, year, reporter)
}

#[tokio::test]
async fn body_mixing_is_rejected_and_reported() -> Result<()> {
    let (level, _, reporter) = guards();
    let req = common::scoped(Method::POST, "/students").with_json_body(json!({"schoolLevelId": "L2", "name": "Awa"}));

    let err = level.check(&req).await.unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert_eq!(
        err.to_string(),
        "Attempt to mix school levels detected: request context school level is 'L1' but the body contains 'L2'"
    );
    assert_eq!(err.details()["contextValue"], "L1");
    assert_eq!(err.details()["attemptedValue"], "L2");

    let violations = reporter.violations();
    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.kind, ViolationKind::DimensionMixing);
    assert_eq!(violation.tenant_id, "T1");
    assert_eq!(violation.user_id, "u-42");
    assert_eq!(violation.endpoint, "/students");
    assert_eq!(violation.method, "POST");
    assert_eq!(violation.code, "DIMENSION_MIXING_ATTEMPT");
    Ok(())
}

#[tokio::test]
async fn query_mixing_is_rejected() -> Result<()> {
    let (level, _, _) = guards();
    let req = common::scoped(Method::GET, "/students").with_query("schoolLevelId", "L2");

    let err = level.check(&req).await.unwrap_err();
    assert_eq!(
        err,
        ScopeError::DimensionMixingAttempt {
            dimension: Dimension::SchoolLevel,
            location: DimensionSource::Query,
            context_value: "L1".into(),
            attempted_value: "L2".into(),
        }
    );
    assert_eq!(
        err.to_string(),
        "School level mismatch: request context school level is 'L1' but query parameter schoolLevelId is 'L2'"
    );
    Ok(())
}

#[tokio::test]
async fn bulk_body_with_one_foreign_element_is_rejected() -> Result<()> {
    let (level, _, _) = guards();
    let req = common::scoped(Method::POST, "/students").with_json_body(json!([
        {"name": "a", "schoolLevelId": "L1"},
        {"name": "b", "schoolLevelId": "L2"}
    ]));

    let err = level.check(&req).await.unwrap_err();
    assert!(matches!(
        err,
        ScopeError::DimensionMixingAttempt { location: DimensionSource::Body, ref attempted_value, .. }
            if attempted_value == "L2"
    ));
    Ok(())
}

#[tokio::test]
async fn repeated_header_with_another_value_is_mixing() -> Result<()> {
    let (_, year, reporter) = guards();
    let req = common::scoped(Method::GET, "/grades").with_header("X-Academic-Year-ID", "2023-2024");

    let err = year.check(&req).await.unwrap_err();
    assert_eq!(
        err,
        ScopeError::DimensionMixingAttempt {
            dimension: Dimension::AcademicYear,
            location: DimensionSource::Header,
            context_value: common::YEAR.into(),
            attempted_value: "2023-2024".into(),
        }
    );
    assert_eq!(reporter.violations()[0].kind, ViolationKind::DimensionMixing);
    Ok(())
}

#[tokio::test]
async fn academic_year_is_mandatory() -> Result<()> {
    let (_, year, reporter) = guards();
    let req = common::request(Method::GET, "/grades")
        .with_identity(common::staff())
        .with_header("X-Tenant-ID", "T1")
        .with_header("X-School-Level-ID", "L1");

    let err = year.check(&req).await.unwrap_err();
    assert_eq!(err, ScopeError::MandatoryDimensionMissing { dimension: Dimension::AcademicYear });
    assert_eq!(err.status_code(), 400);
    assert_eq!(reporter.violations()[0].kind, ViolationKind::MissingDimension);
    Ok(())
}

#[tokio::test]
async fn academic_year_mixing_in_body() -> Result<()> {
    let (_, year, _) = guards();
    let req = common::scoped(Method::POST, "/grades").with_json_body(json!({"academicYearId": "2023-2024"}));

    let err = year.check(&req).await.unwrap_err();
    assert!(matches!(
        err,
        ScopeError::DimensionMixingAttempt { dimension: Dimension::AcademicYear, location: DimensionSource::Body, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn guard_trusts_resolved_value_over_request_sources() -> Result<()> {
    let (level, _, _) = guards();
    // the resolver attached L2; a header saying L1 does not change what the guard compares against
    let mut req = common::scoped(Method::POST, "/students").with_json_body(json!({"schoolLevelId": "L1"}));
    req.resolved.school_level_id = Some("L2".into());

    let err = level.check(&req).await.unwrap_err();
    assert!(matches!(
        err,
        ScopeError::DimensionMixingAttempt { ref context_value, ref attempted_value, .. }
            if context_value == "L2" && attempted_value == "L1"
    ));
    Ok(())
}

#[tokio::test]
async fn anonymous_rejections_are_not_reported() -> Result<()> {
    let (level, _, reporter) = guards();
    let req = common::request(Method::POST, "/students")
        .with_header("X-Tenant-ID", "T1")
        .with_header("X-School-Level-ID", "L1")
        .with_json_body(json!({"schoolLevelId": "L2"}));

    assert!(level.check(&req).await.is_err());
    assert!(reporter.is_empty());
    Ok(())
}

#[tokio::test]
async fn exemption_only_for_aggregation_module() -> Result<()> {
    let (level, year, reporter) = guards();

    let overview = common::request(Method::GET, "/overview")
        .with_identity(common::staff())
        .with_header("X-Tenant-ID", "T1");
    level.check(&overview).await?;
    year.check(&overview).await?;

    let misuse = overview.clone().with_header("X-Module-Type", "finance");
    let err = level.check(&misuse).await.unwrap_err();
    assert_eq!(err.error_code(), "EXEMPTION_NOT_AUTHORIZED");
    assert_eq!(reporter.violations()[0].kind, ViolationKind::ExemptionMisuse);
    Ok(())
}
