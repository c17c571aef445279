// scope/extractor.rs - Dimension source extraction
//
// Pure reads over a ScopedRequest: no lookups, no mutation, and absence is a
// normal outcome (None) that later stages turn into a rejection.

use std::sync::Arc;

use crate::scope::dimension::{Candidate, Dimension, DimensionSource, ModuleType};
use crate::scope::error::ScopeError;
use crate::scope::request::ScopedRequest;
use crate::scope::routes::RouteModuleTable;

/// Host labels that never name a tenant
const NON_TENANT_LABELS: [&str; 2] = ["www", "api"];

#[derive(Debug, Clone)]
pub struct DimensionExtractor {
    modules: Arc<RouteModuleTable>,
}

impl DimensionExtractor {
    pub fn new(modules: Arc<RouteModuleTable>) -> Self {
        Self { modules }
    }

    /// Every candidate value for `dimension`, highest priority first
    pub fn candidates(&self, req: &ScopedRequest, dimension: Dimension) -> Vec<Candidate> {
        dimension
            .sources()
            .iter()
            .enumerate()
            .filter_map(|(priority, &source)| {
                self.read(req, dimension, source).map(|value| Candidate {
                    value,
                    source,
                    priority: priority as u8,
                })
            })
            .collect()
    }

    /// The winning candidate for `dimension`, if any source supplies one
    pub fn extract(&self, req: &ScopedRequest, dimension: Dimension) -> Option<Candidate> {
        dimension
            .sources()
            .iter()
            .enumerate()
            .find_map(|(priority, &source)| {
                self.read(req, dimension, source).map(|value| Candidate {
                    value,
                    source,
                    priority: priority as u8,
                })
            })
    }

    /// Module for the request; an explicit value that names no known module is an error
    pub fn module(&self, req: &ScopedRequest) -> Result<Option<ModuleType>, ScopeError> {
        match self.extract(req, Dimension::Module) {
            Some(candidate) => candidate
                .value
                .parse::<ModuleType>()
                .map(Some)
                .map_err(|_| ScopeError::InvalidModule { value: candidate.value }),
            None => Ok(None),
        }
    }

    /// A header repeated with different values is a mixing attempt, never a
    /// first-one-wins lookup
    pub fn ensure_single_header(&self, req: &ScopedRequest, dimension: Dimension) -> Result<(), ScopeError> {
        let mut values = req.header_values(dimension.header()).into_iter();
        let Some(first) = values.next() else {
            return Ok(());
        };

        match values.find(|v| *v != first) {
            Some(attempted) => Err(ScopeError::DimensionMixingAttempt {
                dimension,
                location: DimensionSource::Header,
                context_value: first,
                attempted_value: attempted,
            }),
            None => Ok(()),
        }
    }

    fn read(&self, req: &ScopedRequest, dimension: Dimension, source: DimensionSource) -> Option<String> {
        match source {
            DimensionSource::Resolved => req.resolved.get(dimension),
            DimensionSource::Header => req.header_value(dimension.header()),
            DimensionSource::IdentityClaim => match dimension {
                Dimension::Tenant => req
                    .identity
                    .as_ref()
                    .and_then(|i| i.tenant_id.as_deref())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
                _ => None,
            },
            DimensionSource::Subdomain => subdomain_label(req.host()?.as_str()),
            DimensionSource::Query => req.query_values(dimension.field()).into_iter().next(),
            DimensionSource::Body => req.body_values(dimension.field()).into_iter().next(),
            DimensionSource::RouteMapping => self.modules.resolve(&req.path).map(|m| m.as_str().to_string()),
        }
    }
}

/// Left-most label of a host with at least three labels, e.g. `lycee-nord` in
/// `lycee-nord.school.example`. IP addresses and service labels are ignored.
fn subdomain_label(host: &str) -> Option<String> {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 {
        return None;
    }

    let label = labels[0].trim();
    if label.is_empty() || NON_TENANT_LABELS.contains(&label) {
        return None;
    }
    Some(label.to_string())
}
