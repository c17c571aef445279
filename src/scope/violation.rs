// scope/violation.rs - Isolation violation records and the reporter port

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::scope::error::ScopeError;
use crate::scope::request::ScopedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingDimension,
    DimensionMixing,
    OverrideAttempt,
    ExemptionMisuse,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MissingDimension => "missing_dimension",
            ViolationKind::DimensionMixing => "dimension_mixing",
            ViolationKind::OverrideAttempt => "override_attempt",
            ViolationKind::ExemptionMisuse => "exemption_misuse",
        }
    }
}

/// Audit record for one rejected request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub id: Uuid,
    pub kind: ViolationKind,
    pub tenant_id: String,
    pub user_id: String,
    pub endpoint: String,
    pub method: String,
    pub code: &'static str,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

impl Violation {
    /// Build a record for `error`, or `None` when the request has no known tenant
    /// and user yet or the error is not an isolation violation
    pub fn for_rejection(req: &ScopedRequest, error: &ScopeError) -> Option<Self> {
        let kind = error.violation_kind()?;
        let tenant_id = known_tenant(req)?;
        let user_id = req.user_id()?.to_string();

        Some(Self {
            id: Uuid::new_v4(),
            kind,
            tenant_id,
            user_id,
            endpoint: req.path.clone(),
            method: req.method.to_string(),
            code: error.error_code(),
            details: error.to_string(),
            occurred_at: Utc::now(),
        })
    }
}

fn known_tenant(req: &ScopedRequest) -> Option<String> {
    req.context
        .as_ref()
        .map(|ctx| ctx.tenant_id().to_string())
        .or_else(|| req.resolved.tenant_id.clone())
        .or_else(|| req.identity.as_ref().and_then(|i| i.tenant_id.clone()))
}

/// Audit sink for isolation violations.
///
/// Implementations must not block the request and must swallow their own
/// failures: reporting never changes the outcome of the pipeline.
#[async_trait]
pub trait ViolationReporter: Send + Sync {
    async fn report(&self, violation: Violation);
}

/// Report `error` if it is a violation and the tenant and user are known
pub async fn report_rejection(reporter: &dyn ViolationReporter, req: &ScopedRequest, error: &ScopeError) {
    match Violation::for_rejection(req, error) {
        Some(violation) => reporter.report(violation).await,
        None if error.violation_kind().is_some() => {
            tracing::debug!(
                "Skipping violation report for {} {}: tenant or user unknown",
                req.method,
                req.path
            );
        }
        None => {}
    }
}

/// Structured `tracing` events on the `audit` target
#[derive(Debug, Default, Clone)]
pub struct TracingViolationReporter;

#[async_trait]
impl ViolationReporter for TracingViolationReporter {
    async fn report(&self, violation: Violation) {
        tracing::warn!(
            target: "audit",
            violation_id = %violation.id,
            kind = violation.kind.as_str(),
            tenant_id = %violation.tenant_id,
            user_id = %violation.user_id,
            endpoint = %violation.endpoint,
            method = %violation.method,
            code = violation.code,
            details = %violation.details,
            "Isolation violation"
        );
    }
}

/// Posts violations as JSON to an audit endpoint on a detached task
#[derive(Debug, Clone)]
pub struct WebhookViolationReporter {
    client: reqwest::Client,
    url: String,
}

impl WebhookViolationReporter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl ViolationReporter for WebhookViolationReporter {
    async fn report(&self, violation: Violation) {
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&violation).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::trace!("Violation {} delivered to {}", violation.id, url);
                }
                Ok(resp) => {
                    tracing::warn!("Audit webhook rejected violation {}: HTTP {}", violation.id, resp.status());
                }
                Err(e) => {
                    tracing::warn!("Audit webhook unreachable for violation {}: {}", violation.id, e);
                }
            }
        });
    }
}

/// Forwards every violation to each inner reporter in turn
#[derive(Clone, Default)]
pub struct FanoutViolationReporter {
    reporters: Vec<Arc<dyn ViolationReporter>>,
}

impl FanoutViolationReporter {
    pub fn new(reporters: Vec<Arc<dyn ViolationReporter>>) -> Self {
        Self { reporters }
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

#[async_trait]
impl ViolationReporter for FanoutViolationReporter {
    async fn report(&self, violation: Violation) {
        for reporter in &self.reporters {
            reporter.report(violation.clone()).await;
        }
    }
}

/// Keeps violations in memory for inspection
#[derive(Debug, Default)]
pub struct MemoryViolationReporter {
    violations: Mutex<Vec<Violation>>,
}

impl MemoryViolationReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.violations.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ViolationReporter for MemoryViolationReporter {
    async fn report(&self, violation: Violation) {
        if let Ok(mut violations) = self.violations.lock() {
            violations.push(violation);
        }
    }
}
