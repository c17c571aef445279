use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

use crate::directory::{DependencyCheck, DirectoryError, SchoolLevel, ScopeDirectory, Tenant};
use crate::scope::dimension::ModuleType;

/// Directory backed by the platform's Postgres registry tables:
/// `tenants`, `school_levels`, `module_enablements`, `module_dependencies`
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool that connects on first use, so startup does not depend on the database
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)?;

        tracing::info!("Postgres directory pool configured (max_connections={})", max_connections);
        Ok(Self { pool })
    }
}

#[async_trait]
impl ScopeDirectory for PgDirectory {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, DirectoryError> {
        let query = r#"
            SELECT id, name, status
            FROM tenants
            WHERE id = $1
            AND deleted_at IS NULL
        "#;

        let row = sqlx::query(query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Tenant, DirectoryError> {
            Ok(Tenant {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                status: row.try_get("status")?,
            })
        })
        .transpose()
    }

    async fn get_school_level(
        &self,
        tenant_id: &str,
        school_level_id: &str,
    ) -> Result<Option<SchoolLevel>, DirectoryError> {
        let query = r#"
            SELECT id, tenant_id, name, is_active
            FROM school_levels
            WHERE id = $1
            AND tenant_id = $2
            AND deleted_at IS NULL
        "#;

        let row = sqlx::query(query)
            .bind(school_level_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<SchoolLevel, DirectoryError> {
            Ok(SchoolLevel {
                id: row.try_get("id")?,
                tenant_id: row.try_get("tenant_id")?,
                name: row.try_get("name")?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn is_module_enabled(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<bool, DirectoryError> {
        // A NULL level only matches tenant-wide rows
        let query = r#"
            SELECT EXISTS (
                SELECT 1
                FROM module_enablements
                WHERE tenant_id = $1
                AND module = $2
                AND enabled = true
                AND (school_level_id IS NULL OR school_level_id = $3)
            ) AS enabled
        "#;

        let row = sqlx::query(query)
            .bind(tenant_id)
            .bind(module.as_str())
            .bind(school_level_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("enabled")?)
    }

    async fn check_module_dependencies(
        &self,
        tenant_id: &str,
        module: ModuleType,
        school_level_id: Option<&str>,
    ) -> Result<DependencyCheck, DirectoryError> {
        let query = r#"
            SELECT d.depends_on
            FROM module_dependencies d
            WHERE d.module = $1
            AND NOT EXISTS (
                SELECT 1
                FROM module_enablements e
                WHERE e.tenant_id = $2
                AND e.module = d.depends_on
                AND e.enabled = true
                AND (e.school_level_id IS NULL OR e.school_level_id = $3)
            )
            ORDER BY d.depends_on
        "#;

        let rows = sqlx::query(query)
            .bind(module.as_str())
            .bind(tenant_id)
            .bind(school_level_id)
            .fetch_all(&self.pool)
            .await?;

        let missing = rows
            .iter()
            .map(|row| row.try_get::<String, _>("depends_on"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DependencyCheck::from_missing(missing))
    }
}
