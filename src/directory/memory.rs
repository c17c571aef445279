use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::directory::{DependencyCheck, DirectoryError, SchoolLevel, ScopeDirectory, Tenant};
use crate::scope::dimension::ModuleType;

/// A module switched on for a tenant, either tenant-wide or for one school level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEnablement {
    pub tenant_id: String,
    #[serde(default)]
    pub school_level_id: Option<String>,
    pub module: String,
}

/// YAML-serializable directory contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub tenants: Vec<Tenant>,
    #[serde(default)]
    pub school_levels: Vec<SchoolLevel>,
    #[serde(default)]
    pub enablements: Vec<ModuleEnablement>,
    /// module name -> modules it requires
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

/// In-process directory backed by a fixture, for development and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    fixture: DirectoryFixture,
}

impl MemoryDirectory {
    pub fn new(fixture: DirectoryFixture) -> Self {
        Self { fixture }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DirectoryError> {
        serde_yaml::from_str(yaml)
            .map(Self::new)
            .map_err(|e| DirectoryError::Fixture(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::Fixture(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn fixture(&self) -> &DirectoryFixture {
        &self.fixture
    }

    pub fn with_tenant(mut self, id: &str, status: &str) -> Self {
        self.fixture.tenants.push(Tenant {
            id: id.to_string(),
            name: id.to_string(),
            status: status.to_string(),
        });
        self
    }

    pub fn with_school_level(mut self, tenant_id: &str, id: &str, is_active: bool) -> Self {
        self.fixture.school_levels.push(SchoolLevel {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: id.to_string(),
            is_active,
        });
        self
    }

    pub fn with_module(mut self, tenant_id: &str, school_level_id: Option<&str>, module: &str) -> Self {
        self.fixture.enablements.push(ModuleEnablement {
            tenant_id: tenant_id.to_string(),
            school_level_id: school_level_id.map(str::to_string),
            module: module.to_string(),
        });
        self
    }

    pub fn with_dependency(mut self, module: &str, requires: &str) -> Self {
        self.fixture
            .dependencies
            .entry(module.to_string())
            .or_default()
            .push(requires.to_string());
        self
    }

    /// Tenant-wide enablements count for every level; a `None` level only
    /// matches tenant-wide enablements
    fn enabled(&self, tenant_id: &str, module: &str, school_level_id: Option<&str>) -> bool {
        self.fixture.enablements.iter().any(|e| {
            e.tenant_id == tenant_id
                && e.module == module
                && (e.school_level_id.is_none() || e.school_level_id.as_deref() == school_level_id)
        })
    }
}

#[async_trait]
impl ScopeDirectory for MemoryDirectory {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, DirectoryError> {
        Ok(self.fixture.tenants.iter().find(|t| t.id == tenant_id).cloned())
    }

    async fn get_school_level(
        &self,
        tenant_id: &str,
        school_level_id: &str,
    ) -> Result<Option<SchoolLevel>, DirectoryError> {
        Ok(self
            .fixture
            .school_levels
            .iter()
            .find(|l| l.id == school_level_id && l.tenant_id == tenant_id)
            .cloned())
    }

    async fn is_module_enabled(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<bool, DirectoryError> {
        Ok(self.enabled(tenant_id, module.as_str(), school_level_id))
    }

    async fn check_module_dependencies(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<DependencyCheck, DirectoryError> {
        let missing = self
            .fixture
            .dependencies
            .get(module.as_str())
            .map(|deps| {
                deps.iter()
                    .filter(|dep| !self.enabled(tenant_id, dep, school_level_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(DependencyCheck::from_missing(missing))
    }
}
