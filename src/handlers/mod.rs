// handlers/mod.rs - Two tiers of handlers
//
// Public (no scope) -> Scoped (full scope pipeline, RequestContext available)

pub mod public; // `/`, `/health`
pub mod scoped; // module routes and the cross-level overview
