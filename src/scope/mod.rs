// Request scoping: resolve tenant, school level, module and academic year for
// every request and enforce isolation before any handler runs

pub mod context;
pub mod dimension;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod interceptor;
pub mod pipeline;
pub mod request;
pub mod resolver;
pub mod routes;
pub mod violation;

pub use context::{CanonicalDimensions, Identity, RequestContext, ResolvedDimensions};
pub use dimension::{Candidate, Dimension, DimensionSource, IsolationDimension, ModuleType};
pub use error::ScopeError;
pub use extractor::DimensionExtractor;
pub use guard::IsolationGuard;
pub use interceptor::EnforcementInterceptor;
pub use pipeline::{PipelineSettings, ScopePipeline, ScopeStage, StageOrder};
pub use request::{RequestBody, ScopedRequest};
pub use resolver::ContextResolver;
pub use routes::{RouteCapabilities, RouteDescriptor, RouteModuleTable, ScopeRoutes};
pub use violation::{
    FanoutViolationReporter, MemoryViolationReporter, TracingViolationReporter, Violation, ViolationKind,
    ViolationReporter, WebhookViolationReporter,
};
