// Module endpoints behind the scope pipeline. They trust RequestContext as
// given: tenant, school level, module and academic year are already validated.

use axum::{
    extract::{Extension, Query},
    Json,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::middleware::{ApiResponse, ApiResult};
use crate::scope::{CanonicalDimensions, RequestContext};

/// GET /<module route> - Echo the scope a listing would run under
pub async fn list(
    ctx: RequestContext,
    Extension(canonical): Extension<CanonicalDimensions>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<Value> {
    tracing::debug!(
        "List {} for tenant {} level {:?}",
        ctx.module_type(),
        ctx.tenant_id(),
        ctx.school_level_id()
    );

    Ok(ApiResponse::success(json!({
        "context": ctx,
        "canonical": canonical,
        "query": query,
    })))
}

/// POST /<module route> - Echo the canonicalized payload a create would persist
pub async fn create(
    ctx: RequestContext,
    Extension(canonical): Extension<CanonicalDimensions>,
    Json(payload): Json<Value>,
) -> ApiResult<Value> {
    Ok(ApiResponse::created(json!({
        "context": ctx,
        "canonical": canonical,
        "record": payload,
    })))
}

/// GET /overview - Cross-level aggregation, school level may be absent
pub async fn overview(ctx: RequestContext) -> ApiResult<Value> {
    let scope = match ctx.school_level_id() {
        Some(_) => "school-level",
        None => "cross-level",
    };

    Ok(ApiResponse::success(json!({
        "context": ctx,
        "scope": scope,
    })))
}
