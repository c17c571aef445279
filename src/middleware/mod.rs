pub mod identity;
pub mod response;
pub mod scope;

pub use identity::identity_middleware;
pub use response::{ApiResponse, ApiResult};
pub use scope::scope_middleware;
