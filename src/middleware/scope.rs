// middleware/scope.rs - Runs the scope pipeline in front of every routed handler
//
// Buffers the body, builds a ScopedRequest, runs the pipeline and writes the
// canonical body and query back onto the request. Handlers then read the
// RequestContext extension and never re-validate it.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::{header, request::Parts, uri::PathAndQuery, HeaderValue, Uri},
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::scope::{Identity, RequestBody, RequestContext, ResolvedDimensions, ScopedRequest};

pub async fn scope_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let matched = request.extensions().get::<MatchedPath>().map(|m| m.as_str().to_string());
    let route = state.routes.describe(matched.as_deref(), &path);

    if route.public {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.max_body_bytes).await.map_err(|e| {
        tracing::debug!("Failed to buffer body for {} {}: {}", parts.method, path, e);
        ApiError::payload_too_large(format!("Request body exceeds {} bytes", state.max_body_bytes))
    })?;

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = RequestBody::from_bytes(content_type.as_deref(), bytes)
        .map_err(|e| ApiError::invalid_json(format!("Invalid JSON body: {}", e)))?;

    let mut scoped = ScopedRequest::new(parts.method.clone(), path.clone())
        .with_route(route)
        .with_raw_query(parts.uri.query());
    scoped.headers = parts.headers.clone();
    scoped.body = body;
    scoped.identity = parts.extensions.get::<Identity>().cloned();
    // values attached by an outer layer outrank everything in the request
    if let Some(ctx) = parts.extensions.get::<RequestContext>() {
        scoped.resolved = ResolvedDimensions::from(ctx);
    } else if let Some(resolved) = parts.extensions.get::<ResolvedDimensions>() {
        scoped.resolved = resolved.clone();
    }

    let scoped = state.pipeline.run(scoped).await?;

    parts.uri = rewrite_query(&parts.uri, &path, &scoped.query_string())?;

    let ScopedRequest { body, context, canonical, .. } = scoped;
    if body.is_json() {
        parts
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    let bytes = body.into_bytes();
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    if let Some(context) = context {
        parts.extensions.insert(context);
    }
    parts.extensions.insert(canonical);

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

fn rewrite_query(uri: &Uri, path: &str, query: &str) -> Result<Uri, ApiError> {
    let path_and_query = if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    };

    let mut uri_parts = uri.clone().into_parts();
    uri_parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query.as_str())
            .map_err(|e| ApiError::bad_request(format!("Invalid request URI: {}", e)))?,
    );
    Uri::from_parts(uri_parts).map_err(|e| ApiError::bad_request(format!("Invalid request URI: {}", e)))
}

/// Handlers take the resolved context as an argument
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned().ok_or_else(|| {
            tracing::error!("RequestContext missing for {} {}", parts.method, parts.uri.path());
            ApiError::internal_server_error("Request context unavailable")
        })
    }
}
