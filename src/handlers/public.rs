use axum::extract::State;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// GET / - Service description
pub async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "School Scope API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-tenant school API with per-request tenant, school level, module and academic year isolation",
        "headers": {
            "tenant": "X-Tenant-ID",
            "school_level": "X-School-Level-ID",
            "module": "X-Module-Type",
            "academic_year": "X-Academic-Year-ID",
        },
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "academics": "/students (scoped)",
            "finance": "/payments, /expenses (scoped)",
            "human_resources": "/teachers, /hr (scoped)",
            "pedagogy": "/classes, /subjects (scoped)",
            "examinations": "/exams, /grades (scoped)",
            "overview": "/overview (cross-level aggregation)",
        }
    })))
}

/// GET /health - Liveness plus the configured pipeline stages
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "pipeline": state.pipeline.stage_names(),
    })))
}
