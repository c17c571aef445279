// scope/resolver.rs - Context resolution: extract each dimension in a fixed order,
// validate it against the directories, and build the immutable RequestContext.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::directory::{DirectoryError, ScopeDirectory};
use crate::scope::context::{RequestContext, ResolvedDimensions};
use crate::scope::dimension::{Dimension, DimensionSource, ModuleType};
use crate::scope::error::ScopeError;
use crate::scope::extractor::DimensionExtractor;
use crate::scope::pipeline::{ScopeStage, StageOrder};
use crate::scope::request::ScopedRequest;
use crate::scope::violation::{report_rejection, ViolationReporter};

pub struct ContextResolver {
    directory: Arc<dyn ScopeDirectory>,
    extractor: DimensionExtractor,
    aggregation_module: ModuleType,
    lookup_timeout: Duration,
    reporter: Option<Arc<dyn ViolationReporter>>,
}

impl ContextResolver {
    pub fn new(
        directory: Arc<dyn ScopeDirectory>,
        extractor: DimensionExtractor,
        aggregation_module: ModuleType,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            extractor,
            aggregation_module,
            lookup_timeout,
            reporter: None,
        }
    }

    /// Report mixing and exemption rejections once the caller is known
    pub fn with_reporter(mut self, reporter: Arc<dyn ViolationReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Resolve and validate every dimension, short-circuiting on the first failure.
    ///
    /// On cross-level aggregation routes a missing school level is accepted when
    /// the module is the aggregation module; module enablement is then checked
    /// tenant-wide.
    pub async fn resolve(&self, req: &ScopedRequest) -> Result<RequestContext, ScopeError> {
        let outcome = self.resolve_dimensions(req).await;
        if let (Err(error), Some(reporter)) = (&outcome, &self.reporter) {
            report_rejection(reporter.as_ref(), req, error).await;
        }
        outcome
    }

    async fn resolve_dimensions(&self, req: &ScopedRequest) -> Result<RequestContext, ScopeError> {
        for dimension in Dimension::ALL {
            self.extractor.ensure_single_header(req, dimension)?;
        }

        // 1-2. tenant
        let tenant = self
            .extractor
            .extract(req, Dimension::Tenant)
            .ok_or(ScopeError::MissingTenant)?;
        self.ensure_claim_agrees(req, &tenant.value, tenant.source)?;

        let record = self
            .lookup("tenant", self.directory.get_tenant(&tenant.value))
            .await?
            .ok_or_else(|| ScopeError::UnknownTenant { tenant_id: tenant.value.clone() })?;
        if !record.is_active() {
            return Err(ScopeError::InactiveTenant { tenant_id: tenant.value });
        }
        let tenant_id = tenant.value;

        // 3-4. school level
        let school_level_id = match self.extractor.extract(req, Dimension::SchoolLevel) {
            Some(level) => {
                let record = self
                    .lookup("school level", self.directory.get_school_level(&tenant_id, &level.value))
                    .await?
                    .filter(|l| l.tenant_id == tenant_id)
                    .ok_or_else(|| ScopeError::UnknownSchoolLevel {
                        tenant_id: tenant_id.clone(),
                        school_level_id: level.value.clone(),
                    })?;
                if !record.is_active {
                    return Err(ScopeError::InactiveSchoolLevel { school_level_id: level.value });
                }
                Some(level.value)
            }
            None if req.route.cross_level_aggregation => None,
            None => return Err(ScopeError::MissingSchoolLevel),
        };

        // 5. module
        let module = self.extractor.module(req)?.ok_or(ScopeError::MissingModule)?;
        if school_level_id.is_none() && module != self.aggregation_module {
            return Err(ScopeError::ExemptionNotAuthorized {
                module: Some(module),
                aggregation_module: self.aggregation_module,
            });
        }

        // 6. enablement and dependencies
        let level = school_level_id.as_deref();
        let enabled = self
            .lookup("module enablement", self.directory.is_module_enabled(&tenant_id, module, level))
            .await?;
        if !enabled {
            return Err(ScopeError::ModuleDisabled {
                module,
                school_level_id: school_level_id.clone(),
            });
        }

        let dependencies = self
            .lookup(
                "module dependencies",
                self.directory.check_module_dependencies(&tenant_id, module, level),
            )
            .await?;
        if !dependencies.satisfied || !dependencies.missing.is_empty() {
            return Err(ScopeError::ModuleDependencyMissing {
                module,
                missing: dependencies.missing,
            });
        }

        // 7. identity, plus the academic year when already supplied (enforced by its guard)
        let user_id = req.user_id().map(str::to_string);
        let academic_year_id = self.extractor.extract(req, Dimension::AcademicYear).map(|c| c.value);

        tracing::debug!(
            "Resolved context tenant={} school_level={:?} module={} academic_year={:?}",
            tenant_id,
            school_level_id,
            module,
            academic_year_id
        );

        // 8.
        Ok(RequestContext::new(tenant_id, school_level_id, module, academic_year_id, user_id))
    }

    /// An explicit tenant header may not point at another tenant than the caller's identity
    fn ensure_claim_agrees(&self, req: &ScopedRequest, tenant_id: &str, source: DimensionSource) -> Result<(), ScopeError> {
        let claim = req
            .identity
            .as_ref()
            .and_then(|i| i.tenant_id.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty());

        match claim {
            Some(claim) if claim != tenant_id => {
                tracing::warn!(
                    "Tenant {} from {} conflicts with identity tenant {} on {} {}",
                    tenant_id,
                    source,
                    claim,
                    req.method,
                    req.path
                );
                Err(ScopeError::DimensionMixingAttempt {
                    dimension: Dimension::Tenant,
                    location: source,
                    context_value: claim.to_string(),
                    attempted_value: tenant_id.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Bounded directory call; errors and timeouts fail closed
    async fn lookup<T>(
        &self,
        stage: &'static str,
        call: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, ScopeError> {
        match timeout(self.lookup_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("Directory lookup for {} failed: {}", stage, e);
                Err(ScopeError::DirectoryUnavailable { stage })
            }
            Err(_elapsed) => {
                tracing::error!("Directory lookup for {} timed out after {:?}", stage, self.lookup_timeout);
                Err(ScopeError::DirectoryUnavailable { stage })
            }
        }
    }
}

#[async_trait]
impl ScopeStage for ContextResolver {
    fn name(&self) -> &'static str {
        "context_resolver"
    }

    fn order(&self) -> StageOrder {
        StageOrder::ContextResolution
    }

    async fn apply(&self, req: &mut ScopedRequest) -> Result<(), ScopeError> {
        let context = self.resolve(req).await?;
        req.resolved = ResolvedDimensions::from(&context);
        req.context = Some(context);
        Ok(())
    }
}
