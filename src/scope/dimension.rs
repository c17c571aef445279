// scope/dimension.rs - Scoping dimensions, their request locations and the module catalogue

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const SCHOOL_LEVEL_HEADER: &str = "x-school-level-id";
pub const MODULE_HEADER: &str = "x-module-type";
pub const ACADEMIC_YEAR_HEADER: &str = "x-academic-year-id";

/// One of the four axes every business request is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Tenant,
    SchoolLevel,
    Module,
    AcademicYear,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Tenant,
        Dimension::SchoolLevel,
        Dimension::Module,
        Dimension::AcademicYear,
    ];

    /// Header carrying an explicit value for this dimension
    pub fn header(&self) -> &'static str {
        match self {
            Dimension::Tenant => TENANT_HEADER,
            Dimension::SchoolLevel => SCHOOL_LEVEL_HEADER,
            Dimension::Module => MODULE_HEADER,
            Dimension::AcademicYear => ACADEMIC_YEAR_HEADER,
        }
    }

    /// Field name used in query strings, JSON bodies and error details
    pub fn field(&self) -> &'static str {
        match self {
            Dimension::Tenant => "tenantId",
            Dimension::SchoolLevel => "schoolLevelId",
            Dimension::Module => "moduleType",
            Dimension::AcademicYear => "academicYearId",
        }
    }

    /// Human-readable name, lower case
    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Tenant => "tenant",
            Dimension::SchoolLevel => "school level",
            Dimension::Module => "module",
            Dimension::AcademicYear => "academic year",
        }
    }

    /// Ranked request locations consulted for this dimension, highest priority first
    pub fn sources(&self) -> &'static [DimensionSource] {
        use DimensionSource::*;

        match self {
            Dimension::Tenant => &[Resolved, Header, IdentityClaim, Subdomain],
            Dimension::SchoolLevel => &[Resolved, Header, Query, Body],
            Dimension::Module => &[Resolved, Header, RouteMapping],
            Dimension::AcademicYear => &[Resolved, Header, Query, Body],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// The dimensions whose values must never mix inside one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationDimension {
    SchoolLevel,
    AcademicYear,
}

impl IsolationDimension {
    pub fn dimension(self) -> Dimension {
        match self {
            IsolationDimension::SchoolLevel => Dimension::SchoolLevel,
            IsolationDimension::AcademicYear => Dimension::AcademicYear,
        }
    }
}

/// Request location a dimension value was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionSource {
    /// Value attached by an earlier pipeline stage
    Resolved,
    Header,
    IdentityClaim,
    /// Left-most host label; a placeholder until tenant slugs are looked up
    Subdomain,
    Query,
    Body,
    RouteMapping,
}

impl DimensionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionSource::Resolved => "resolved",
            DimensionSource::Header => "header",
            DimensionSource::IdentityClaim => "identity_claim",
            DimensionSource::Subdomain => "subdomain",
            DimensionSource::Query => "query",
            DimensionSource::Body => "body",
            DimensionSource::RouteMapping => "route_mapping",
        }
    }
}

impl fmt::Display for DimensionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral (value, source, priority) triple produced during extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub value: String,
    pub source: DimensionSource,
    /// Position in the dimension's source ranking, 0 is highest
    pub priority: u8,
}

/// Business modules that can be enabled per tenant and school level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleType {
    Academics,
    Finance,
    HumanResources,
    Pedagogy,
    Examinations,
    Communication,
    Library,
    Transport,
    Canteen,
    /// Read-only aggregation across school levels
    Overview,
}

impl ModuleType {
    pub const ALL: [ModuleType; 10] = [
        ModuleType::Academics,
        ModuleType::Finance,
        ModuleType::HumanResources,
        ModuleType::Pedagogy,
        ModuleType::Examinations,
        ModuleType::Communication,
        ModuleType::Library,
        ModuleType::Transport,
        ModuleType::Canteen,
        ModuleType::Overview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Academics => "academics",
            ModuleType::Finance => "finance",
            ModuleType::HumanResources => "human-resources",
            ModuleType::Pedagogy => "pedagogy",
            ModuleType::Examinations => "examinations",
            ModuleType::Communication => "communication",
            ModuleType::Library => "library",
            ModuleType::Transport => "transport",
            ModuleType::Canteen => "canteen",
            ModuleType::Overview => "overview",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown module type '{0}'")]
pub struct UnknownModuleType(pub String);

impl FromStr for ModuleType {
    type Err = UnknownModuleType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        ModuleType::ALL
            .into_iter()
            .find(|module| module.as_str() == normalized)
            .ok_or_else(|| UnknownModuleType(s.to_string()))
    }
}
