// scope/interceptor.rs - Canonicalization of isolation dimensions
//
// Runs after the guards. Writes the authoritative value into the body and the
// query wherever it is missing, rejects any attempt to supply a different one,
// and records it in CanonicalDimensions for handlers.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::scope::dimension::{Dimension, DimensionSource, IsolationDimension};
use crate::scope::error::ScopeError;
use crate::scope::extractor::DimensionExtractor;
use crate::scope::pipeline::{ScopeStage, StageOrder};
use crate::scope::request::{RequestBody, ScopedRequest};
use crate::scope::violation::{report_rejection, ViolationReporter};

pub struct EnforcementInterceptor {
    dimension: IsolationDimension,
    extractor: DimensionExtractor,
    reporter: Arc<dyn ViolationReporter>,
}

impl EnforcementInterceptor {
    pub fn school_level(extractor: DimensionExtractor, reporter: Arc<dyn ViolationReporter>) -> Self {
        Self {
            dimension: IsolationDimension::SchoolLevel,
            extractor,
            reporter,
        }
    }

    pub fn academic_year(extractor: DimensionExtractor, reporter: Arc<dyn ViolationReporter>) -> Self {
        Self {
            dimension: IsolationDimension::AcademicYear,
            extractor,
            reporter,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension.dimension()
    }

    /// Canonicalize `req` in place. On error the request is left as it was.
    pub async fn enforce(&self, req: &mut ScopedRequest) -> Result<(), ScopeError> {
        if req.route.cross_level_aggregation {
            return Ok(());
        }

        match self.canonicalize(req) {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    "{} interceptor rejected {} {}: {}",
                    self.dimension().label(),
                    req.method,
                    req.path,
                    error
                );
                report_rejection(self.reporter.as_ref(), req, &error).await;
                Err(error)
            }
        }
    }

    fn canonicalize(&self, req: &mut ScopedRequest) -> Result<(), ScopeError> {
        let dimension = self.dimension();
        let value = self
            .extractor
            .extract(req, dimension)
            .map(|c| c.value)
            .ok_or(ScopeError::MandatoryDimensionMissing { dimension })?;
        let field = dimension.field();

        // check both locations before touching either
        let conflict = |location: DimensionSource, values: Vec<String>| {
            values.into_iter().find(|v| *v != value).map(|given| ScopeError::CannotOverrideDimension {
                dimension,
                location,
                expected: value.clone(),
                given,
            })
        };
        if let Some(error) = conflict(DimensionSource::Body, req.body_values(field)) {
            return Err(error);
        }
        if let Some(error) = conflict(DimensionSource::Query, req.query_values(field)) {
            return Err(error);
        }

        inject_body(&mut req.body, field, &value);
        inject_query(&mut req.query, field, &value);

        match self.dimension {
            IsolationDimension::SchoolLevel => req.resolved.school_level_id = Some(value.clone()),
            IsolationDimension::AcademicYear => req.resolved.academic_year_id = Some(value.clone()),
        }
        req.canonical.set(self.dimension, value);
        Ok(())
    }
}

/// Write `value` under `field` in the body object, or in every object element of
/// an array body. Other JSON values and opaque payloads are left alone.
fn inject_body(body: &mut RequestBody, field: &str, value: &str) {
    match body {
        RequestBody::Empty => {
            let mut map = Map::new();
            map.insert(field.to_string(), Value::String(value.to_string()));
            *body = RequestBody::Json(Value::Object(map));
        }
        RequestBody::Json(Value::Object(map)) => inject_object(map, field, value),
        RequestBody::Json(Value::Array(items)) => {
            for map in items.iter_mut().filter_map(Value::as_object_mut) {
                inject_object(map, field, value);
            }
        }
        RequestBody::Json(_) | RequestBody::Opaque(_) => {}
    }
}

/// Padded strings and numbers that matched the canonical value are rewritten too,
/// so the handler sees the exact string
fn inject_object(map: &mut Map<String, Value>, field: &str, value: &str) {
    map.insert(field.to_string(), Value::String(value.to_string()));
}

/// Leave exactly one `field=value` pair, at the position of the first entry for
/// `field` or appended when there is none
fn inject_query(query: &mut Vec<(String, String)>, field: &str, value: &str) {
    let mut kept = false;
    query.retain_mut(|(k, v)| {
        if k != field {
            return true;
        }
        if kept {
            return false;
        }
        *v = value.to_string();
        kept = true;
        true
    });
    if !kept {
        query.push((field.to_string(), value.to_string()));
    }
}

#[async_trait]
impl ScopeStage for EnforcementInterceptor {
    fn name(&self) -> &'static str {
        match self.dimension {
            IsolationDimension::SchoolLevel => "school_level_interceptor",
            IsolationDimension::AcademicYear => "academic_year_interceptor",
        }
    }

    fn order(&self) -> StageOrder {
        match self.dimension {
            IsolationDimension::SchoolLevel => StageOrder::SchoolLevelInterceptor,
            IsolationDimension::AcademicYear => StageOrder::AcademicYearInterceptor,
        }
    }

    async fn apply(&self, req: &mut ScopedRequest) -> Result<(), ScopeError> {
        self.enforce(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::routes::{RouteDescriptor, ScopeRoutes};
    use crate::scope::violation::MemoryViolationReporter;
    use axum::body::Bytes;
    use axum::http::Method;
    use serde_json::json;

    fn interceptor() -> EnforcementInterceptor {
        let extractor = DimensionExtractor::new(Arc::new(ScopeRoutes::default().module_table()));
        EnforcementInterceptor::school_level(extractor, Arc::new(MemoryViolationReporter::new()))
    }

    #[tokio::test]
    async fn test_header_value_written_to_body_and_query() {
        let mut req = ScopedRequest::new(Method::POST, "/students")
            .with_header("X-School-Level-ID", "L1")
            .with_json_body(json!({"name": "Awa"}));

        interceptor().enforce(&mut req).await.unwrap();
        assert_eq!(req.body, RequestBody::Json(json!({"name": "Awa", "schoolLevelId": "L1"})));
        assert_eq!(req.query_values("schoolLevelId"), vec!["L1".to_string()]);
        assert_eq!(req.canonical.school_level_id.as_deref(), Some("L1"));
    }

    #[tokio::test]
    async fn test_body_override_rejected_without_mutation() {
        let mut req = ScopedRequest::new(Method::POST, "/students")
            .with_header("X-School-Level-ID", "L1")
            .with_json_body(json!({"schoolLevelId": "L2"}));
        let before = req.clone();

        let err = interceptor().enforce(&mut req).await.unwrap_err();
        assert_eq!(
            err,
            ScopeError::CannotOverrideDimension {
                dimension: Dimension::SchoolLevel,
                location: DimensionSource::Body,
                expected: "L1".into(),
                given: "L2".into(),
            }
        );
        assert_eq!(req.body, before.body);
        assert!(req.query.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_and_empty_bodies() {
        let mut bulk = ScopedRequest::new(Method::POST, "/students")
            .with_header("X-School-Level-ID", "L1")
            .with_json_body(json!([{"name": "a"}, {"name": "b", "schoolLevelId": "L1"}, 7]));
        interceptor().enforce(&mut bulk).await.unwrap();
        assert_eq!(
            bulk.body,
            RequestBody::Json(json!([
                {"name": "a", "schoolLevelId": "L1"},
                {"name": "b", "schoolLevelId": "L1"},
                7
            ]))
        );

        let mut empty = ScopedRequest::new(Method::GET, "/students").with_header("X-School-Level-ID", "L1");
        interceptor().enforce(&mut empty).await.unwrap();
        assert_eq!(empty.body, RequestBody::Json(json!({"schoolLevelId": "L1"})));
    }

    #[tokio::test]
    async fn test_opaque_body_untouched() {
        let mut req = ScopedRequest::new(Method::POST, "/students").with_header("X-School-Level-ID", "L1");
        req.body = RequestBody::Opaque(Bytes::from_static(b"id,name"));

        interceptor().enforce(&mut req).await.unwrap();
        assert_eq!(req.body, RequestBody::Opaque(Bytes::from_static(b"id,name")));
        assert_eq!(req.query_string(), "schoolLevelId=L1");
    }

    #[tokio::test]
    async fn test_exempt_route_passes_through() {
        let mut req = ScopedRequest::new(Method::GET, "/overview").with_route(RouteDescriptor::cross_level_aggregation());
        interceptor().enforce(&mut req).await.unwrap();
        assert_eq!(req.body, RequestBody::Empty);
        assert!(req.canonical.school_level_id.is_none());
    }

    #[tokio::test]
    async fn test_matching_values_rewritten_to_canonical_string() {
        let mut padded = ScopedRequest::new(Method::POST, "/students")
            .with_header("X-School-Level-ID", "L1")
            .with_json_body(json!([{"schoolLevelId": " L1 "}, {"schoolLevelId": "L1"}]));
        interceptor().enforce(&mut padded).await.unwrap();
        assert_eq!(
            padded.body,
            RequestBody::Json(json!([{"schoolLevelId": "L1"}, {"schoolLevelId": "L1"}]))
        );

        let extractor = DimensionExtractor::new(Arc::new(ScopeRoutes::default().module_table()));
        let year = EnforcementInterceptor::academic_year(extractor, Arc::new(MemoryViolationReporter::new()));
        let mut numeric = ScopedRequest::new(Method::POST, "/grades")
            .with_header("X-Academic-Year-ID", "2024")
            .with_json_body(json!({"academicYearId": 2024}));
        year.enforce(&mut numeric).await.unwrap();
        assert_eq!(numeric.body, RequestBody::Json(json!({"academicYearId": "2024"})));
    }

    #[tokio::test]
    async fn test_query_left_with_single_entry() {
        let mut req = ScopedRequest::new(Method::GET, "/students")
            .with_header("X-School-Level-ID", "L1")
            .with_raw_query(Some("schoolLevelId=L1&page=2&schoolLevelId=&schoolLevelId=%20L1"));

        interceptor().enforce(&mut req).await.unwrap();
        assert_eq!(req.query_string(), "schoolLevelId=L1&page=2");
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let mut req = ScopedRequest::new(Method::POST, "/students")
            .with_header("X-School-Level-ID", "L1")
            .with_raw_query(Some("schoolLevelId="))
            .with_json_body(json!({"name": "Awa"}));

        interceptor().enforce(&mut req).await.unwrap();
        let once = req.clone();
        interceptor().enforce(&mut req).await.unwrap();
        assert_eq!(req.body, once.body);
        assert_eq!(req.query, once.query);
        assert_eq!(req.query_string(), "schoolLevelId=L1");
    }
}
