mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::Method;
use serde_json::json;

use school_scope_api::directory::MemoryDirectory;
use school_scope_api::scope::{Dimension, ModuleType, RequestBody, ScopeError, ViolationKind};

#[tokio::test]
async fn valid_request_gets_context_and_canonical_values() -> Result<()> {
    let (pipeline, reporter) = common::pipeline();
    let req = common::scoped(Method::POST, "/students").with_json_body(json!({"name": "Awa"}));

    let out = pipeline.run(req).await?;
    let ctx = out.context.clone().expect("context");
    assert_eq!(ctx.tenant_id(), "T1");
    assert_eq!(ctx.school_level_id(), Some("L1"));
    assert_eq!(ctx.module_type(), ModuleType::Academics);
    assert_eq!(ctx.academic_year_id(), Some(common::YEAR));

    assert_eq!(
        out.body,
        RequestBody::Json(json!({"name": "Awa", "schoolLevelId": "L1", "academicYearId": common::YEAR}))
    );
    assert_eq!(
        out.query_string(),
        format!("schoolLevelId=L1&academicYearId={}", common::YEAR)
    );
    assert!(reporter.is_empty());
    Ok(())
}

#[tokio::test]
async fn school_level_mixing_stops_the_pipeline() -> Result<()> {
    let (pipeline, reporter) = common::pipeline();
    let req = common::scoped(Method::POST, "/students").with_json_body(json!({"schoolLevelId": "L2"}));

    let err = pipeline.run(req).await.unwrap_err();
    assert_eq!(err.error_code(), "DIMENSION_MIXING_ATTEMPT");
    assert_eq!(err.status_code(), 403);
    assert!(err.to_string().contains("'L1'") && err.to_string().contains("'L2'"));

    let violations = reporter.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::DimensionMixing);
    assert_eq!(violations[0].tenant_id, "T1");
    Ok(())
}

#[tokio::test]
async fn inactive_tenant_is_rejected_before_any_guard() -> Result<()> {
    let directory = MemoryDirectory::default()
        .with_tenant("T1", "inactive")
        .with_school_level("T1", "L1", true)
        .with_module("T1", None, "academics");
    let (pipeline, reporter) = common::pipeline_with(Arc::new(directory));

    let err = pipeline.run(common::scoped(Method::GET, "/students")).await.unwrap_err();
    assert_eq!(err, ScopeError::InactiveTenant { tenant_id: "T1".into() });
    assert_eq!(err.status_code(), 403);
    assert!(reporter.is_empty());
    Ok(())
}

#[tokio::test]
async fn finance_without_accounting_setup_is_rejected() -> Result<()> {
    let (pipeline, _) = common::pipeline();

    let err = pipeline.run(common::scoped(Method::GET, "/payments")).await.unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert_eq!(err.error_code(), "MODULE_DEPENDENCY_MISSING");
    assert_eq!(err.to_json()["details"]["missing"], json!(["accounting-setup"]));
    Ok(())
}

#[tokio::test]
async fn missing_academic_year_is_rejected() -> Result<()> {
    let (pipeline, reporter) = common::pipeline();
    let req = common::request(Method::GET, "/grades")
        .with_identity(common::staff())
        .with_header("X-Tenant-ID", "T1")
        .with_header("X-School-Level-ID", "L1");

    let err = pipeline.run(req).await.unwrap_err();
    assert_eq!(err, ScopeError::MandatoryDimensionMissing { dimension: Dimension::AcademicYear });
    assert_eq!(reporter.violations()[0].kind, ViolationKind::MissingDimension);
    Ok(())
}

#[tokio::test]
async fn second_run_is_a_no_op() -> Result<()> {
    let (pipeline, _) = common::pipeline();
    let req = common::scoped(Method::POST, "/grades")
        .with_raw_query(Some("page=2"))
        .with_json_body(json!([{"score": 14}, {"score": 17, "schoolLevelId": "L1"}]));

    let once = pipeline.run(req).await?;
    let twice = pipeline.run(once.clone()).await?;

    assert_eq!(twice.body, once.body);
    assert_eq!(twice.query, once.query);
    assert_eq!(twice.context, once.context);
    assert_eq!(twice.canonical, once.canonical);
    Ok(())
}

#[tokio::test]
async fn canonical_values_round_trip_through_body_and_query() -> Result<()> {
    let (pipeline, _) = common::pipeline();

    // supplied only in the body
    let req = common::request(Method::POST, "/students")
        .with_identity(common::staff())
        .with_json_body(json!({"schoolLevelId": "L2", "academicYearId": common::YEAR}));
    let out = pipeline.run(req).await?;

    assert_eq!(out.query_values("schoolLevelId"), vec!["L2".to_string()]);
    assert_eq!(out.query_values("academicYearId"), vec![common::YEAR.to_string()]);
    assert_eq!(out.canonical.school_level_id.as_deref(), Some("L2"));
    Ok(())
}

#[tokio::test]
async fn handler_sees_one_canonical_value_per_field() -> Result<()> {
    let (pipeline, _) = common::pipeline();

    // a blank duplicate passes the guard but must not survive into the query
    let req = common::scoped(Method::GET, "/students").with_raw_query(Some("schoolLevelId=L1&schoolLevelId="));
    let out = pipeline.run(req).await?;
    assert_eq!(
        out.query_string(),
        format!("schoolLevelId=L1&academicYearId={}", common::YEAR)
    );

    // padded values match, then reach the handler in canonical form
    let req = common::scoped(Method::POST, "/students").with_json_body(json!([
        {"schoolLevelId": " L1 ", "name": "a"},
        {"academicYearId": format!(" {} ", common::YEAR), "name": "b"}
    ]));
    let out = pipeline.run(req).await?;
    assert_eq!(
        out.body,
        RequestBody::Json(json!([
            {"schoolLevelId": "L1", "academicYearId": common::YEAR, "name": "a"},
            {"schoolLevelId": "L1", "academicYearId": common::YEAR, "name": "b"}
        ]))
    );
    Ok(())
}

#[tokio::test]
async fn conflicting_repeated_header_stops_the_pipeline() -> Result<()> {
    let (pipeline, reporter) = common::pipeline();
    let req = common::scoped(Method::GET, "/students").with_header("X-School-Level-ID", "L2");

    let err = pipeline.run(req).await.unwrap_err();
    assert_eq!(err.error_code(), "DIMENSION_MIXING_ATTEMPT");
    assert_eq!(err.to_json()["details"]["attemptedValue"], "L2");
    assert_eq!(reporter.violations().len(), 1);
    Ok(())
}

#[tokio::test]
async fn overview_runs_without_school_level() -> Result<()> {
    let (pipeline, _) = common::pipeline();
    let req = common::request(Method::GET, "/overview")
        .with_identity(common::staff())
        .with_header("X-Tenant-ID", "T1");

    let out = pipeline.run(req).await?;
    let ctx = out.context.expect("context");
    assert_eq!(ctx.module_type(), ModuleType::Overview);
    assert_eq!(ctx.school_level_id(), None);
    assert_eq!(ctx.academic_year_id(), None);
    assert_eq!(out.body, RequestBody::Empty);
    Ok(())
}

#[tokio::test]
async fn exemption_cannot_be_borrowed_by_other_modules() -> Result<()> {
    let (pipeline, _) = common::pipeline();
    let req = common::request(Method::GET, "/overview")
        .with_identity(common::staff())
        .with_header("X-Tenant-ID", "T1")
        .with_header("X-Module-Type", "academics");

    let err = pipeline.run(req).await.unwrap_err();
    assert_eq!(
        err,
        ScopeError::ExemptionNotAuthorized {
            module: Some(ModuleType::Academics),
            aggregation_module: ModuleType::Overview,
        }
    );
    Ok(())
}

#[tokio::test]
async fn public_route_passes_untouched() -> Result<()> {
    let (pipeline, _) = common::pipeline();
    let out = pipeline.run(common::request(Method::GET, "/health")).await?;
    assert!(out.context.is_none());
    assert_eq!(out.body, RequestBody::Empty);
    Ok(())
}

#[tokio::test]
async fn slow_directory_rejects_instead_of_allowing() -> Result<()> {
    let (pipeline, _) = common::pipeline_with(Arc::new(common::SlowDirectory {
        inner: common::directory(),
        delay: Duration::from_secs(2),
    }));

    let err = pipeline.run(common::scoped(Method::GET, "/students")).await.unwrap_err();
    assert_eq!(err.error_code(), "DIRECTORY_UNAVAILABLE");
    Ok(())
}
