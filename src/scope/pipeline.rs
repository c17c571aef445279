// scope/pipeline.rs - Ordered scope pipeline
//
// Stages run strictly in StageOrder: resolve the context, guard each isolation
// dimension, then enforce canonical values. The first failure stops the run and
// the caller gets the error instead of a partially scoped request.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::directory::ScopeDirectory;
use crate::scope::dimension::ModuleType;
use crate::scope::error::ScopeError;
use crate::scope::extractor::DimensionExtractor;
use crate::scope::guard::IsolationGuard;
use crate::scope::interceptor::EnforcementInterceptor;
use crate::scope::request::ScopedRequest;
use crate::scope::resolver::ContextResolver;
use crate::scope::routes::RouteModuleTable;
use crate::scope::violation::ViolationReporter;

/// Position of a stage in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum StageOrder {
    ContextResolution = 0,
    SchoolLevelGuard = 1,
    AcademicYearGuard = 2,
    SchoolLevelInterceptor = 3,
    AcademicYearInterceptor = 4,
}

impl StageOrder {
    pub const ALL: [StageOrder; 5] = [
        StageOrder::ContextResolution,
        StageOrder::SchoolLevelGuard,
        StageOrder::AcademicYearGuard,
        StageOrder::SchoolLevelInterceptor,
        StageOrder::AcademicYearInterceptor,
    ];
}

/// One step of the scope pipeline
#[async_trait]
pub trait ScopeStage: Send + Sync {
    /// Stage name for logging and debugging
    fn name(&self) -> &'static str;

    fn order(&self) -> StageOrder;

    async fn apply(&self, req: &mut ScopedRequest) -> Result<(), ScopeError>;
}

pub type StageBox = Box<dyn ScopeStage>;

/// Settings shared by the standard stages
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub aggregation_module: ModuleType,
    pub lookup_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            aggregation_module: ModuleType::Overview,
            lookup_timeout: Duration::from_millis(2000),
        }
    }
}

pub struct ScopePipeline {
    stages: Vec<StageBox>,
}

impl ScopePipeline {
    /// Assemble a pipeline from one stage per StageOrder slot
    pub fn new(
        resolver: ContextResolver,
        school_level_guard: IsolationGuard,
        academic_year_guard: IsolationGuard,
        school_level_interceptor: EnforcementInterceptor,
        academic_year_interceptor: EnforcementInterceptor,
    ) -> Self {
        let mut stages: Vec<StageBox> = vec![
            Box::new(resolver),
            Box::new(school_level_guard),
            Box::new(academic_year_guard),
            Box::new(school_level_interceptor),
            Box::new(academic_year_interceptor),
        ];
        stages.sort_by_key(|stage| stage.order());

        for stage in &stages {
            tracing::debug!("Registered scope stage '{}' at {:?}", stage.name(), stage.order());
        }

        Self { stages }
    }

    /// The production wiring: every stage shares one extractor and one reporter
    pub fn standard(
        directory: Arc<dyn ScopeDirectory>,
        reporter: Arc<dyn ViolationReporter>,
        modules: Arc<RouteModuleTable>,
        settings: PipelineSettings,
    ) -> Self {
        let extractor = DimensionExtractor::new(modules);
        let aggregation = settings.aggregation_module;

        Self::new(
            ContextResolver::new(directory, extractor.clone(), aggregation, settings.lookup_timeout)
                .with_reporter(reporter.clone()),
            IsolationGuard::school_level(extractor.clone(), reporter.clone(), aggregation),
            IsolationGuard::academic_year(extractor.clone(), reporter.clone(), aggregation),
            EnforcementInterceptor::school_level(extractor.clone(), reporter.clone()),
            EnforcementInterceptor::academic_year(extractor, reporter),
        )
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order. Public routes pass through untouched.
    pub async fn run(&self, mut req: ScopedRequest) -> Result<ScopedRequest, ScopeError> {
        if req.route.public {
            tracing::trace!("Public route {} {}, scope pipeline skipped", req.method, req.path);
            return Ok(req);
        }

        let start_time = Instant::now();

        for stage in &self.stages {
            let stage_start = Instant::now();
            if let Err(error) = stage.apply(&mut req).await {
                tracing::info!(
                    "Scope pipeline stopped at '{}' for {} {}: {} ({:?})",
                    stage.name(),
                    req.method,
                    req.path,
                    error.error_code(),
                    start_time.elapsed()
                );
                return Err(error);
            }
            tracing::trace!("Scope stage '{}' completed in {:?}", stage.name(), stage_start.elapsed());
        }

        tracing::debug!(
            "Scope pipeline completed for {} {} in {:?}",
            req.method,
            req.path,
            start_time.elapsed()
        );
        Ok(req)
    }
}
