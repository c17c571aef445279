use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::validate_jwt;
use crate::error::ApiError;
use crate::scope::Identity;

/// Optional bearer authentication.
///
/// A request without an Authorization header continues anonymously; a header
/// that is present but malformed or carries an invalid token is rejected.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_bearer_token(request.headers())? {
        let claims = validate_jwt(&token, &state.jwt_secret)?;
        tracing::trace!("Authenticated user {} (tenant {:?})", claims.sub, claims.tenant_id);
        request.extensions_mut().insert(Identity::from(claims));
    }

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        Some(_) => Err(ApiError::unauthorized("Empty JWT token")),
        None => Err(ApiError::unauthorized("Authorization header must use Bearer token format")),
    }
}
