use serde::{Deserialize, Serialize};

use crate::scope::dimension::{Dimension, IsolationDimension, ModuleType};

/// Fully validated scope of one request.
///
/// Built once by the context resolver and never mutated afterwards; handlers
/// read it through the `RequestContext` extractor and trust its values without
/// re-validating tenant, school level, module or academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    tenant_id: String,
    school_level_id: Option<String>,
    module_type: ModuleType,
    academic_year_id: Option<String>,
    user_id: Option<String>,
}

impl RequestContext {
    pub(crate) fn new(
        tenant_id: String,
        school_level_id: Option<String>,
        module_type: ModuleType,
        academic_year_id: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            tenant_id,
            school_level_id,
            module_type,
            academic_year_id,
            user_id,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// `None` only on cross-level aggregation routes
    pub fn school_level_id(&self) -> Option<&str> {
        self.school_level_id.as_deref()
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    /// `None` only on cross-level aggregation routes once the guards have run
    pub fn academic_year_id(&self) -> Option<&str> {
        self.academic_year_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Dimension values attached to the request by earlier pipeline stages.
/// Highest-priority source for every dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDimensions {
    pub tenant_id: Option<String>,
    pub school_level_id: Option<String>,
    pub module_type: Option<ModuleType>,
    pub academic_year_id: Option<String>,
}

impl ResolvedDimensions {
    pub fn get(&self, dimension: Dimension) -> Option<String> {
        match dimension {
            Dimension::Tenant => self.tenant_id.clone(),
            Dimension::SchoolLevel => self.school_level_id.clone(),
            Dimension::Module => self.module_type.map(|m| m.as_str().to_string()),
            Dimension::AcademicYear => self.academic_year_id.clone(),
        }
    }
}

impl From<&RequestContext> for ResolvedDimensions {
    fn from(ctx: &RequestContext) -> Self {
        Self {
            tenant_id: Some(ctx.tenant_id.clone()),
            school_level_id: ctx.school_level_id.clone(),
            module_type: Some(ctx.module_type),
            academic_year_id: ctx.academic_year_id.clone(),
        }
    }
}

/// Canonical isolation values written by the enforcement interceptors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDimensions {
    pub school_level_id: Option<String>,
    pub academic_year_id: Option<String>,
}

impl CanonicalDimensions {
    pub fn set(&mut self, dimension: IsolationDimension, value: String) {
        match dimension {
            IsolationDimension::SchoolLevel => self.school_level_id = Some(value),
            IsolationDimension::AcademicYear => self.academic_year_id = Some(value),
        }
    }
}

/// Caller identity as resolved by the upstream authentication layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
}
