// Collaborator lookups used to validate tenants, school levels and module enablement.
// The directories are owned by other subsystems; this crate only reads them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::dimension::ModuleType;

pub use memory::{DirectoryFixture, MemoryDirectory, ModuleEnablement};
pub use postgres::PgDirectory;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory fixture error: {0}")]
    Fixture(String),

    #[error("Directory backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl Tenant {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolLevel {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCheck {
    pub satisfied: bool,
    pub missing: Vec<String>,
}

impl DependencyCheck {
    pub fn from_missing(missing: Vec<String>) -> Self {
        Self { satisfied: missing.is_empty(), missing }
    }
}

/// Read-only view over the tenant, school-level and module-enablement directories.
///
/// A `school_level_id` of `None` asks about tenant-wide enablement, which is what
/// cross-level aggregation routes are checked against.
#[async_trait]
pub trait ScopeDirectory: Send + Sync {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, DirectoryError>;

    async fn get_school_level(
        &self,
        tenant_id: &str,
        school_level_id: &str,
    ) -> Result<Option<SchoolLevel>, DirectoryError>;

    async fn is_module_enabled(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<bool, DirectoryError>;

    async fn check_module_dependencies(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<DependencyCheck, DirectoryError>;
}
