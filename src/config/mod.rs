use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::scope::ModuleType;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is required when DIRECTORY_BACKEND=postgres")]
    MissingDatabaseUrl,

    #[error("SECURITY_JWT_SECRET must be set outside development")]
    DefaultJwtSecret,

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub directory: DirectoryConfig,
    pub audit: AuditConfig,
    pub scope: ScopeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub backend: DirectoryBackend,
    pub fixture_file: Option<String>,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enable_logging: bool,
    pub webhook_url: Option<String>,
    pub webhook_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub routes_file: Option<String>,
    pub aggregation_module: ModuleType,
}

const DEV_JWT_SECRET: &str = "development-secret-change-me";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Some(port) = env::var("SERVER_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = v.parse().unwrap_or(self.server.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }

        // Directory overrides
        match env::var("DIRECTORY_BACKEND").as_deref() {
            Ok("postgres") | Ok("pg") => self.directory.backend = DirectoryBackend::Postgres,
            Ok("memory") => self.directory.backend = DirectoryBackend::Memory,
            _ => {}
        }
        if let Ok(v) = env::var("DIRECTORY_FIXTURE_FILE") {
            self.directory.fixture_file = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.directory.database_url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.directory.max_connections = v.parse().unwrap_or(self.directory.max_connections);
        }
        if let Ok(v) = env::var("DIRECTORY_LOOKUP_TIMEOUT_MS") {
            self.directory.lookup_timeout_ms = v.parse().unwrap_or(self.directory.lookup_timeout_ms);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_ENABLE_LOGGING") {
            self.audit.enable_logging = v.parse().unwrap_or(self.audit.enable_logging);
        }
        if let Ok(v) = env::var("AUDIT_WEBHOOK_URL") {
            self.audit.webhook_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("AUDIT_WEBHOOK_TIMEOUT_MS") {
            self.audit.webhook_timeout_ms = v.parse().unwrap_or(self.audit.webhook_timeout_ms);
        }

        // Scope overrides
        if let Ok(v) = env::var("SCOPE_ROUTES_FILE") {
            self.scope.routes_file = Some(v);
        }
        if let Ok(v) = env::var("SCOPE_AGGREGATION_MODULE") {
            match v.parse() {
                Ok(module) => self.scope.aggregation_module = module,
                Err(e) => tracing::warn!("Ignoring SCOPE_AGGREGATION_MODULE: {}", e),
            }
        }

        self
    }

    /// Reject combinations the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.backend == DirectoryBackend::Postgres && self.directory.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        if self.environment != Environment::Development && self.security.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::DefaultJwtSecret);
        }
        if self.directory.lookup_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DIRECTORY_LOOKUP_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.directory.lookup_timeout_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.audit.webhook_timeout_ms)
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
            },
            directory: DirectoryConfig {
                backend: DirectoryBackend::Memory,
                fixture_file: Some("config/directory.yaml".to_string()),
                database_url: None,
                max_connections: 10,
                lookup_timeout_ms: 2000,
            },
            audit: AuditConfig {
                enable_logging: true,
                webhook_url: None,
                webhook_timeout_ms: 2000,
            },
            scope: ScopeConfig {
                routes_file: None,
                aggregation_module: ModuleType::Overview,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
            },
            directory: DirectoryConfig {
                backend: DirectoryBackend::Postgres,
                fixture_file: None,
                database_url: None,
                max_connections: 20,
                lookup_timeout_ms: 1000,
            },
            audit: AuditConfig {
                enable_logging: true,
                webhook_url: None,
                webhook_timeout_ms: 2000,
            },
            scope: ScopeConfig {
                routes_file: Some("config/scope-routes.yaml".to_string()),
                aggregation_module: ModuleType::Overview,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 3000,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
            },
            directory: DirectoryConfig {
                backend: DirectoryBackend::Postgres,
                fixture_file: None,
                database_url: None,
                max_connections: 50,
                lookup_timeout_ms: 500,
            },
            audit: AuditConfig {
                enable_logging: true,
                webhook_url: None,
                webhook_timeout_ms: 1000,
            },
            scope: ScopeConfig {
                routes_file: Some("config/scope-routes.yaml".to_string()),
                aggregation_module: ModuleType::Overview,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
