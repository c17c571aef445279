use serde_json::{json, Value};
use thiserror::Error;

use crate::scope::dimension::{Dimension, DimensionSource, ModuleType};
use crate::scope::violation::ViolationKind;

/// Terminal rejections produced by the scope pipeline. None of them is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("Tenant ID is required: send the X-Tenant-ID header or authenticate with a tenant-bound identity")]
    MissingTenant,

    #[error("Tenant '{tenant_id}' does not exist")]
    UnknownTenant { tenant_id: String },

    #[error("Tenant '{tenant_id}' is not active")]
    InactiveTenant { tenant_id: String },

    #[error("School level ID is required: every request must be scoped to exactly one school level")]
    MissingSchoolLevel,

    #[error("School level '{school_level_id}' does not exist for tenant '{tenant_id}'")]
    UnknownSchoolLevel { tenant_id: String, school_level_id: String },

    #[error("School level '{school_level_id}' is not active")]
    InactiveSchoolLevel { school_level_id: String },

    #[error("Module type is required: send the X-Module-Type header or call a module route")]
    MissingModule,

    #[error("Invalid module type '{value}'")]
    InvalidModule { value: String },

    #[error("Module '{module}' is not enabled for this school level")]
    ModuleDisabled { module: ModuleType, school_level_id: Option<String> },

    #[error("Module '{module}' requires the following modules to be enabled: {}", .missing.join(", "))]
    ModuleDependencyMissing { module: ModuleType, missing: Vec<String> },

    #[error("{} is mandatory for this operation", .dimension.field())]
    MandatoryDimensionMissing { dimension: Dimension },

    #[error("{}", mixing_message(.dimension, .location, .context_value, .attempted_value))]
    DimensionMixingAttempt {
        dimension: Dimension,
        location: DimensionSource,
        context_value: String,
        attempted_value: String,
    },

    #[error("Cannot override {} in {location}: expected '{expected}', got '{given}'", .dimension.label())]
    CannotOverrideDimension {
        dimension: Dimension,
        location: DimensionSource,
        expected: String,
        given: String,
    },

    #[error("Cross-level access is only authorized for the '{aggregation_module}' module")]
    ExemptionNotAuthorized {
        module: Option<ModuleType>,
        aggregation_module: ModuleType,
    },

    #[error("Unable to validate {stage}: directory unavailable")]
    DirectoryUnavailable { stage: &'static str },
}

fn mixing_message(dimension: &Dimension, location: &DimensionSource, context: &str, attempted: &str) -> String {
    let label = dimension.label();
    match location {
        DimensionSource::Body => format!(
            "Attempt to mix {label}s detected: request context {label} is '{context}' but the body contains '{attempted}'"
        ),
        DimensionSource::Query => format!(
            "{} mismatch: request context {label} is '{context}' but query parameter {} is '{attempted}'",
            capitalize(label),
            dimension.field()
        ),
        other => format!(
            "Attempt to mix {label}s detected: '{context}' conflicts with '{attempted}' supplied via {other}"
        ),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl ScopeError {
    pub fn status_code(&self) -> u16 {
        match self {
            ScopeError::MissingTenant
            | ScopeError::MissingSchoolLevel
            | ScopeError::MissingModule
            | ScopeError::InvalidModule { .. }
            | ScopeError::MandatoryDimensionMissing { .. } => 400,
            ScopeError::UnknownTenant { .. }
            | ScopeError::InactiveTenant { .. }
            | ScopeError::UnknownSchoolLevel { .. }
            | ScopeError::InactiveSchoolLevel { .. }
            | ScopeError::ModuleDisabled { .. }
            | ScopeError::ModuleDependencyMissing { .. }
            | ScopeError::DimensionMixingAttempt { .. }
            | ScopeError::CannotOverrideDimension { .. }
            | ScopeError::ExemptionNotAuthorized { .. } => 403,
            ScopeError::DirectoryUnavailable { .. } => 503,
        }
    }

    /// Stable, machine-distinguishable error kind
    pub fn error_code(&self) -> &'static str {
        match self {
            ScopeError::MissingTenant => "MISSING_TENANT",
            ScopeError::UnknownTenant { .. } => "UNKNOWN_TENANT",
            ScopeError::InactiveTenant { .. } => "INACTIVE_TENANT",
            ScopeError::MissingSchoolLevel => "MISSING_SCHOOL_LEVEL",
            ScopeError::UnknownSchoolLevel { .. } => "UNKNOWN_SCHOOL_LEVEL",
            ScopeError::InactiveSchoolLevel { .. } => "INACTIVE_SCHOOL_LEVEL",
            ScopeError::MissingModule => "MISSING_MODULE",
            ScopeError::InvalidModule { .. } => "INVALID_MODULE",
            ScopeError::ModuleDisabled { .. } => "MODULE_DISABLED",
            ScopeError::ModuleDependencyMissing { .. } => "MODULE_DEPENDENCY_MISSING",
            ScopeError::MandatoryDimensionMissing { .. } => "MANDATORY_DIMENSION_MISSING",
            ScopeError::DimensionMixingAttempt { .. } => "DIMENSION_MIXING_ATTEMPT",
            ScopeError::CannotOverrideDimension { .. } => "CANNOT_OVERRIDE_DIMENSION",
            ScopeError::ExemptionNotAuthorized { .. } => "EXEMPTION_NOT_AUTHORIZED",
            ScopeError::DirectoryUnavailable { .. } => "DIRECTORY_UNAVAILABLE",
        }
    }

    /// Offending dimension values, safe to return to the caller
    pub fn details(&self) -> Value {
        match self {
            ScopeError::MissingTenant => json!({ "dimension": Dimension::Tenant.field() }),
            ScopeError::MissingSchoolLevel => json!({ "dimension": Dimension::SchoolLevel.field() }),
            ScopeError::MissingModule => json!({ "dimension": Dimension::Module.field() }),
            ScopeError::UnknownTenant { tenant_id } | ScopeError::InactiveTenant { tenant_id } => {
                json!({ "tenantId": tenant_id })
            }
            ScopeError::UnknownSchoolLevel { tenant_id, school_level_id } => {
                json!({ "tenantId": tenant_id, "schoolLevelId": school_level_id })
            }
            ScopeError::InactiveSchoolLevel { school_level_id } => json!({ "schoolLevelId": school_level_id }),
            ScopeError::InvalidModule { value } => json!({ "moduleType": value }),
            ScopeError::ModuleDisabled { module, school_level_id } => {
                json!({ "moduleType": module, "schoolLevelId": school_level_id })
            }
            ScopeError::ModuleDependencyMissing { module, missing } => {
                json!({ "moduleType": module, "missing": missing })
            }
            ScopeError::MandatoryDimensionMissing { dimension } => json!({ "dimension": dimension.field() }),
            ScopeError::DimensionMixingAttempt { dimension, location, context_value, attempted_value } => json!({
                "dimension": dimension.field(),
                "location": location,
                "contextValue": context_value,
                "attemptedValue": attempted_value,
            }),
            ScopeError::CannotOverrideDimension { dimension, location, expected, given } => json!({
                "dimension": dimension.field(),
                "location": location,
                "expected": expected,
                "given": given,
            }),
            ScopeError::ExemptionNotAuthorized { module, aggregation_module } => {
                json!({ "moduleType": module, "aggregationModule": aggregation_module })
            }
            ScopeError::DirectoryUnavailable { stage } => json!({ "stage": stage }),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.to_string(),
            "code": self.error_code(),
            "details": self.details(),
        })
    }

    /// Audit category for rejections that must reach the violation reporter
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            ScopeError::MandatoryDimensionMissing { .. } => Some(ViolationKind::MissingDimension),
            ScopeError::DimensionMixingAttempt { .. } => Some(ViolationKind::DimensionMixing),
            ScopeError::CannotOverrideDimension { .. } => Some(ViolationKind::OverrideAttempt),
            ScopeError::ExemptionNotAuthorized { .. } => Some(ViolationKind::ExemptionMisuse),
            _ => None,
        }
    }
}
