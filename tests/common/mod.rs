#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use axum::Router;

use school_scope_api::app::{build_router, AppState};
use school_scope_api::auth::{generate_jwt, Claims};
use school_scope_api::directory::{
    DependencyCheck, DirectoryError, MemoryDirectory, SchoolLevel, ScopeDirectory, Tenant,
};
use school_scope_api::scope::{
    DimensionExtractor, Identity, MemoryViolationReporter, ModuleType, PipelineSettings, ScopePipeline,
    ScopeRoutes, ScopedRequest,
};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const YEAR: &str = "2024-2025";

/// T1 is active with levels L1, L2 (active) and L3 (inactive); T2 is suspended.
/// Finance is enabled on L1 but depends on accounting-setup, which is enabled nowhere.
pub fn directory() -> MemoryDirectory {
    MemoryDirectory::default()
        .with_tenant("T1", "active")
        .with_tenant("T2", "suspended")
        .with_school_level("T1", "L1", true)
        .with_school_level("T1", "L2", true)
        .with_school_level("T1", "L3", false)
        .with_school_level("T2", "LX", true)
        .with_module("T1", Some("L1"), "academics")
        .with_module("T1", Some("L1"), "finance")
        .with_module("T1", Some("L1"), "examinations")
        .with_module("T1", Some("L2"), "academics")
        .with_module("T1", None, "communication")
        .with_module("T1", None, "overview")
        .with_dependency("finance", "accounting-setup")
}

pub fn routes() -> ScopeRoutes {
    ScopeRoutes::default()
}

pub fn extractor() -> DimensionExtractor {
    DimensionExtractor::new(Arc::new(routes().module_table()))
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        aggregation_module: ModuleType::Overview,
        lookup_timeout: Duration::from_millis(200),
    }
}

pub fn pipeline_with(directory: Arc<dyn ScopeDirectory>) -> (ScopePipeline, Arc<MemoryViolationReporter>) {
    let reporter = Arc::new(MemoryViolationReporter::new());
    let pipeline = ScopePipeline::standard(
        directory,
        reporter.clone(),
        Arc::new(routes().module_table()),
        settings(),
    );
    (pipeline, reporter)
}

pub fn pipeline() -> (ScopePipeline, Arc<MemoryViolationReporter>) {
    pipeline_with(Arc::new(directory()))
}

pub fn staff() -> Identity {
    Identity {
        user_id: Some("u-42".into()),
        tenant_id: Some("T1".into()),
    }
}

/// Request with its route capabilities looked up the way the middleware does
pub fn request(method: Method, path: &str) -> ScopedRequest {
    let route = routes().capabilities().describe(None, path);
    ScopedRequest::new(method, path).with_route(route)
}

/// A fully scoped request for tenant T1, level L1 and the current year
pub fn scoped(method: Method, path: &str) -> ScopedRequest {
    request(method, path)
        .with_identity(staff())
        .with_header("X-Tenant-ID", "T1")
        .with_header("X-School-Level-ID", "L1")
        .with_header("X-Academic-Year-ID", YEAR)
}

pub fn app_with(directory: Arc<dyn ScopeDirectory>) -> (Router, Arc<MemoryViolationReporter>) {
    let (pipeline, reporter) = pipeline_with(directory);
    let state = AppState::new(pipeline, routes().capabilities(), JWT_SECRET, 64 * 1024);
    (build_router(state), reporter)
}

pub fn app() -> (Router, Arc<MemoryViolationReporter>) {
    app_with(Arc::new(directory()))
}

pub fn bearer(user: &str, tenant: Option<&str>) -> String {
    let claims = Claims::new(user, tenant.map(str::to_string), chrono::Duration::hours(1));
    let token = generate_jwt(&claims, JWT_SECRET).expect("token");
    format!("Bearer {}", token)
}

/// Delegates to the fixture after a delay, to exercise lookup timeouts
pub struct SlowDirectory {
    pub inner: MemoryDirectory,
    pub delay: Duration,
}

#[async_trait]
impl ScopeDirectory for SlowDirectory {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, DirectoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_tenant(tenant_id).await
    }

    async fn get_school_level(
        &self,
        tenant_id: &str,
        school_level_id: &str,
    ) -> Result<Option<SchoolLevel>, DirectoryError> {
        self.inner.get_school_level(tenant_id, school_level_id).await
    }

    async fn is_module_enabled(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<bool, DirectoryError> {
        self.inner.is_module_enabled(tenant_id, module, school_level_id).await
    }

    async fn check_module_dependencies(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<DependencyCheck, DirectoryError> {
        self.inner.check_module_dependencies(tenant_id, module, school_level_id).await
    }
}

/// Tenants resolve, every other lookup fails
pub struct BrokenDirectory {
    pub inner: MemoryDirectory,
}

#[async_trait]
impl ScopeDirectory for BrokenDirectory {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, DirectoryError> {
        self.inner.get_tenant(tenant_id).await
    }

    async fn get_school_level(&self, _: &str, _: &str) -> Result<Option<SchoolLevel>, DirectoryError> {
        Err(DirectoryError::Backend("connection reset".into()))
    }

    async fn is_module_enabled(&self, _: &str, _: ModuleType, _: Option<&str>) -> Result<bool, DirectoryError> {
        Err(DirectoryError::Backend("connection reset".into()))
    }

    async fn check_module_dependencies(
        &self,
        _: &str,
        _: ModuleType,
        _: Option<&str>,
    ) -> Result<DependencyCheck, DirectoryError> {
        Err(DirectoryError::Backend("connection reset".into()))
    }
}
