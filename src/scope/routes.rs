// scope/routes.rs - Declarative route tables: route capabilities and route-to-module mapping

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::scope::dimension::ModuleType;

#[derive(Debug, Error)]
pub enum RouteTableError {
    #[error("Failed to read route table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid route table: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid route prefix '{0}': must start with '/'")]
    InvalidPrefix(String),
}

/// Capabilities a router grants one route
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Pre-authentication endpoint, skipped by the whole pipeline
    #[serde(default)]
    pub public: bool,
    /// May be called without school level and academic year, aggregation module only
    #[serde(default)]
    pub cross_level_aggregation: bool,
}

impl RouteDescriptor {
    pub fn public() -> Self {
        Self { public: true, cross_level_aggregation: false }
    }

    pub fn cross_level_aggregation() -> Self {
        Self { public: false, cross_level_aggregation: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub path: String,
    #[serde(flatten)]
    pub descriptor: RouteDescriptor,
}

/// Route capability table consulted by the scope middleware
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteCapabilities {
    rules: Vec<RouteRule>,
}

impl RouteCapabilities {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Describe a route: exact match on the matched route template, then on the raw
    /// path, then the longest rule prefixing the path. Unknown routes get no
    /// capabilities.
    pub fn describe(&self, matched_path: Option<&str>, path: &str) -> RouteDescriptor {
        let exact = |candidate: &str| self.rules.iter().find(|rule| rule.path == candidate);

        if let Some(rule) = matched_path.and_then(exact).or_else(|| exact(path)) {
            return rule.descriptor;
        }

        longest_prefix(self.rules.iter().map(|rule| (rule.path.as_str(), rule)), path)
            .map(|rule| rule.descriptor)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteModule {
    pub prefix: String,
    pub module: ModuleType,
}

/// Ordered prefix -> module pairs used when a request names no module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteModuleTable {
    entries: Vec<RouteModule>,
}

impl RouteModuleTable {
    pub fn new(entries: Vec<RouteModule>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RouteModule] {
        &self.entries
    }

    /// Longest prefix wins; the first declared entry wins a tie
    pub fn resolve(&self, path: &str) -> Option<ModuleType> {
        longest_prefix(self.entries.iter().map(|e| (e.prefix.as_str(), e)), path).map(|e| e.module)
    }
}

/// Both route tables, as loaded from `scope-routes.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRoutes {
    #[serde(default)]
    pub route_modules: Vec<RouteModule>,
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

impl ScopeRoutes {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RouteTableError> {
        let routes: ScopeRoutes = serde_yaml::from_str(yaml)?;
        routes.validate()?;
        Ok(routes)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouteTableError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| RouteTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Load from a file when configured, built-in tables otherwise
    pub fn load(path: Option<&str>) -> Result<Self, RouteTableError> {
        match path {
            Some(path) => {
                tracing::info!("Loading scope route tables from {}", path);
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), RouteTableError> {
        let prefixes = self
            .route_modules
            .iter()
            .map(|m| &m.prefix)
            .chain(self.routes.iter().map(|r| &r.path));

        for prefix in prefixes {
            if !prefix.starts_with('/') {
                return Err(RouteTableError::InvalidPrefix(prefix.clone()));
            }
        }
        Ok(())
    }

    pub fn module_table(&self) -> RouteModuleTable {
        RouteModuleTable::new(self.route_modules.clone())
    }

    pub fn capabilities(&self) -> RouteCapabilities {
        RouteCapabilities::new(self.routes.clone())
    }
}

impl Default for ScopeRoutes {
    fn default() -> Self {
        let module = |prefix: &str, module| RouteModule { prefix: prefix.to_string(), module };
        let rule = |path: &str, descriptor| RouteRule { path: path.to_string(), descriptor };

        Self {
            route_modules: vec![
                module("/students", ModuleType::Academics),
                module("/payments", ModuleType::Finance),
                module("/expenses", ModuleType::Finance),
                module("/teachers", ModuleType::HumanResources),
                module("/hr", ModuleType::HumanResources),
                module("/classes", ModuleType::Pedagogy),
                module("/subjects", ModuleType::Pedagogy),
                module("/exams", ModuleType::Examinations),
                module("/grades", ModuleType::Examinations),
                module("/overview", ModuleType::Overview),
            ],
            routes: vec![
                rule("/", RouteDescriptor::public()),
                rule("/health", RouteDescriptor::public()),
                rule("/overview", RouteDescriptor::cross_level_aggregation()),
            ],
        }
    }
}

fn longest_prefix<'a, T>(items: impl Iterator<Item = (&'a str, T)>, path: &str) -> Option<T> {
    let mut best: Option<(usize, T)> = None;
    for (prefix, item) in items {
        let prefix = normalize_prefix(prefix);
        if !prefix_matches(prefix, path) {
            continue;
        }
        // strictly longer, so the first declared entry keeps a tie
        if best.as_ref().map_or(true, |(len, _)| prefix.len() > *len) {
            best = Some((prefix.len(), item));
        }
    }
    best.map(|(_, item)| item)
}

fn normalize_prefix(prefix: &str) -> &str {
    match prefix.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Prefix match on path segment boundaries: `/hr` matches `/hr/payroll`, not `/hrm`
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_module_table() {
        let table = ScopeRoutes::default().module_table();
        assert_eq!(table.resolve("/students"), Some(ModuleType::Academics));
        assert_eq!(table.resolve("/students/42/grades"), Some(ModuleType::Academics));
        assert_eq!(table.resolve("/expenses"), Some(ModuleType::Finance));
        assert_eq!(table.resolve("/hr/contracts"), Some(ModuleType::HumanResources));
        assert_eq!(table.resolve("/hrm"), None);
        assert_eq!(table.resolve("/unknown"), None);
    }

    #[test]
    fn test_longest_prefix_wins_then_declaration_order() {
        let table = RouteModuleTable::new(vec![
            RouteModule { prefix: "/exams".into(), module: ModuleType::Examinations },
            RouteModule { prefix: "/exams/fees".into(), module: ModuleType::Finance },
            RouteModule { prefix: "/exams/fees/".into(), module: ModuleType::Academics },
        ]);
        assert_eq!(table.resolve("/exams/2024"), Some(ModuleType::Examinations));
        assert_eq!(table.resolve("/exams/fees/7"), Some(ModuleType::Finance));
    }

    #[test]
    fn test_capabilities_exact_then_prefix() {
        let caps = ScopeRoutes::default().capabilities();
        assert!(caps.describe(Some("/health"), "/health").public);
        assert!(caps.describe(None, "/overview/levels").cross_level_aggregation);
        assert!(!caps.describe(None, "/students").public);
        assert!(!caps.describe(Some("/students/:id"), "/students/3").cross_level_aggregation);
    }

    #[test]
    fn test_yaml_round_trip_and_validation() {
        let yaml = r#"
route_modules:
  - prefix: /library
    module: library
routes:
  - path: /reports
    cross_level_aggregation: true
"#;
        let routes = ScopeRoutes::from_yaml_str(yaml).unwrap();
        assert_eq!(routes.module_table().resolve("/library/books"), Some(ModuleType::Library));
        assert!(routes.capabilities().describe(None, "/reports").cross_level_aggregation);

        let bad = "route_modules:\n  - prefix: library\n    module: library\n";
        assert!(matches!(ScopeRoutes::from_yaml_str(bad), Err(RouteTableError::InvalidPrefix(_))));

        let unknown = "route_modules:\n  - prefix: /x\n    module: payroll\n";
        assert!(matches!(ScopeRoutes::from_yaml_str(unknown), Err(RouteTableError::Parse(_))));
    }

    #[test]
    fn test_shipped_route_file_matches_defaults() {
        let shipped = ScopeRoutes::from_yaml_str(include_str!("../../config/scope-routes.yaml")).unwrap();
        assert_eq!(shipped, ScopeRoutes::default());
    }
}
