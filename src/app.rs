// app.rs - Application state, bootstrap from configuration, and the router

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, ConfigError, DirectoryBackend};
use crate::directory::{DirectoryError, MemoryDirectory, PgDirectory, ScopeDirectory};
use crate::handlers::{public, scoped};
use crate::middleware::{identity_middleware, scope_middleware};
use crate::scope::routes::RouteTableError;
use crate::scope::{
    FanoutViolationReporter, PipelineSettings, RouteCapabilities, ScopePipeline, ScopeRoutes,
    TracingViolationReporter, ViolationReporter, WebhookViolationReporter,
};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Routes(#[from] RouteTableError),

    #[error("Directory setup failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Audit webhook setup failed: {0}")]
    Webhook(#[from] reqwest::Error),
}

/// Shared by every middleware and handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ScopePipeline>,
    pub routes: Arc<RouteCapabilities>,
    pub jwt_secret: Arc<str>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        pipeline: ScopePipeline,
        routes: RouteCapabilities,
        jwt_secret: impl Into<Arc<str>>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            routes: Arc::new(routes),
            jwt_secret: jwt_secret.into(),
            max_body_bytes,
        }
    }

    /// Wire directory, reporters and route tables as configured
    pub fn from_config(config: &AppConfig) -> Result<Self, BootstrapError> {
        config.validate()?;

        let routes = ScopeRoutes::load(config.scope.routes_file.as_deref())?;
        let directory = build_directory(config)?;
        let reporter = build_reporter(config)?;

        let pipeline = ScopePipeline::standard(
            directory,
            reporter,
            Arc::new(routes.module_table()),
            PipelineSettings {
                aggregation_module: config.scope.aggregation_module,
                lookup_timeout: config.lookup_timeout(),
            },
        );

        Ok(Self::new(
            pipeline,
            routes.capabilities(),
            config.security.jwt_secret.as_str(),
            config.server.max_request_size_bytes,
        ))
    }
}

fn build_directory(config: &AppConfig) -> Result<Arc<dyn ScopeDirectory>, BootstrapError> {
    match config.directory.backend {
        DirectoryBackend::Memory => {
            let directory = match config.directory.fixture_file.as_deref() {
                Some(path) => {
                    tracing::info!("Loading directory fixture from {}", path);
                    MemoryDirectory::from_file(path)?
                }
                None => {
                    tracing::warn!("No directory fixture configured, every tenant will be unknown");
                    MemoryDirectory::default()
                }
            };
            Ok(Arc::new(directory))
        }
        DirectoryBackend::Postgres => {
            let url = config
                .directory
                .database_url
                .as_deref()
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            let directory = PgDirectory::connect_lazy(url, config.directory.max_connections, config.lookup_timeout())?;
            Ok(Arc::new(directory))
        }
    }
}

fn build_reporter(config: &AppConfig) -> Result<Arc<dyn ViolationReporter>, BootstrapError> {
    let mut reporters: Vec<Arc<dyn ViolationReporter>> = Vec::new();

    if config.audit.enable_logging {
        reporters.push(Arc::new(TracingViolationReporter));
    }
    if let Some(url) = config.audit.webhook_url.as_deref() {
        tracing::info!("Reporting isolation violations to {}", url);
        reporters.push(Arc::new(WebhookViolationReporter::new(url, config.webhook_timeout())?));
    }

    let fanout = FanoutViolationReporter::new(reporters);
    if fanout.is_empty() {
        tracing::warn!("Violation reporting is disabled");
    }
    Ok(Arc::new(fanout))
}

pub fn build_router(state: AppState) -> Router {
    let scoped_routes = Router::new()
        .route("/students", get(scoped::list).post(scoped::create))
        .route("/payments", get(scoped::list).post(scoped::create))
        .route("/expenses", get(scoped::list).post(scoped::create))
        .route("/teachers", get(scoped::list).post(scoped::create))
        .route("/hr", get(scoped::list).post(scoped::create))
        .route("/classes", get(scoped::list).post(scoped::create))
        .route("/subjects", get(scoped::list).post(scoped::create))
        .route("/exams", get(scoped::list).post(scoped::create))
        .route("/grades", get(scoped::list).post(scoped::create))
        .route("/overview", get(scoped::overview))
        // route_layer so MatchedPath is visible; last added runs first
        .route_layer(from_fn_with_state(state.clone(), scope_middleware))
        .route_layer(from_fn_with_state(state.clone(), identity_middleware));

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(scoped_routes)
        // Global middleware
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
