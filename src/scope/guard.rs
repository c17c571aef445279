// scope/guard.rs - Isolation guards for the school-level and academic-year dimensions
//
// Each guard re-derives its dimension on its own instead of trusting the resolver,
// rejects requests that omit it, and rejects any body or query value that differs
// from it. Guards never mutate the request.

use async_trait::async_trait;
use std::sync::Arc;

use crate::scope::dimension::{Dimension, DimensionSource, ModuleType};
use crate::scope::error::ScopeError;
use crate::scope::extractor::DimensionExtractor;
use crate::scope::pipeline::{ScopeStage, StageOrder};
use crate::scope::request::ScopedRequest;
use crate::scope::violation::{report_rejection, ViolationReporter};

pub struct IsolationGuard {
    dimension: Dimension,
    extractor: DimensionExtractor,
    reporter: Arc<dyn ViolationReporter>,
    aggregation_module: ModuleType,
}

impl IsolationGuard {
    pub fn school_level(
        extractor: DimensionExtractor,
        reporter: Arc<dyn ViolationReporter>,
        aggregation_module: ModuleType,
    ) -> Self {
        Self {
            dimension: Dimension::SchoolLevel,
            extractor,
            reporter,
            aggregation_module,
        }
    }

    pub fn academic_year(
        extractor: DimensionExtractor,
        reporter: Arc<dyn ViolationReporter>,
        aggregation_module: ModuleType,
    ) -> Self {
        Self {
            dimension: Dimension::AcademicYear,
            extractor,
            reporter,
            aggregation_module,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Run the guard, reporting any violation before returning it
    pub async fn check(&self, req: &ScopedRequest) -> Result<(), ScopeError> {
        let outcome = self.evaluate(req);
        if let Err(error) = &outcome {
            tracing::warn!(
                "{} guard rejected {} {}: {}",
                self.dimension.label(),
                req.method,
                req.path,
                error
            );
            report_rejection(self.reporter.as_ref(), req, error).await;
        }
        outcome
    }

    fn evaluate(&self, req: &ScopedRequest) -> Result<(), ScopeError> {
        if req.route.cross_level_aggregation {
            return self.check_exemption(req);
        }

        self.extractor.ensure_single_header(req, self.dimension)?;
        let current = self
            .extractor
            .extract(req, self.dimension)
            .ok_or(ScopeError::MandatoryDimensionMissing { dimension: self.dimension })?;

        let field = self.dimension.field();
        let sources = [
            (DimensionSource::Body, req.body_values(field)),
            (DimensionSource::Query, req.query_values(field)),
        ];

        for (location, values) in sources {
            if let Some(attempted) = values.into_iter().find(|v| *v != current.value) {
                return Err(ScopeError::DimensionMixingAttempt {
                    dimension: self.dimension,
                    location,
                    context_value: current.value,
                    attempted_value: attempted,
                });
            }
        }

        Ok(())
    }

    /// The exemption only covers the aggregation module
    fn check_exemption(&self, req: &ScopedRequest) -> Result<(), ScopeError> {
        let module = self.extractor.module(req)?;
        if module == Some(self.aggregation_module) {
            tracing::debug!(
                "{} guard skipped for cross-level route {} {}",
                self.dimension.label(),
                req.method,
                req.path
            );
            return Ok(());
        }

        Err(ScopeError::ExemptionNotAuthorized {
            module,
            aggregation_module: self.aggregation_module,
        })
    }
}

#[async_trait]
impl ScopeStage for IsolationGuard {
    fn name(&self) -> &'static str {
        match self.dimension {
            Dimension::SchoolLevel => "school_level_guard",
            _ => "academic_year_guard",
        }
    }

    fn order(&self) -> StageOrder {
        match self.dimension {
            Dimension::SchoolLevel => StageOrder::SchoolLevelGuard,
            _ => StageOrder::AcademicYearGuard,
        }
    }

    async fn apply(&self, req: &mut ScopedRequest) -> Result<(), ScopeError> {
        self.check(req).await
    }
}
