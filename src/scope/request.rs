// scope/request.rs - Typed request carrier threaded through the scope pipeline

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;

use crate::scope::context::{CanonicalDimensions, Identity, RequestContext, ResolvedDimensions};
use crate::scope::routes::RouteDescriptor;

/// Request payload as seen by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Non-JSON payload, forwarded untouched
    Opaque(Bytes),
}

impl RequestBody {
    /// Classify raw bytes using the request content type
    pub fn from_bytes(content_type: Option<&str>, bytes: Bytes) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(RequestBody::Empty);
        }

        if content_type.map(is_json_content_type).unwrap_or(false) {
            return serde_json::from_slice(&bytes).map(RequestBody::Json);
        }

        Ok(RequestBody::Opaque(bytes))
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Json(value) => Bytes::from(value.to_string()),
            RequestBody::Opaque(bytes) => bytes,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, RequestBody::Json(_))
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// Everything the pipeline needs to know about one inbound request.
///
/// Replaces ad hoc request mutation: earlier stages record what they resolved in
/// `resolved`/`context`, interceptors record canonical values in `canonical`, and
/// the HTTP layer copies body and query back onto the real request afterwards.
#[derive(Debug, Clone)]
pub struct ScopedRequest {
    pub method: Method,
    pub path: String,
    pub route: RouteDescriptor,
    pub headers: HeaderMap,
    /// Query pairs in their original order, repeated keys preserved
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub identity: Option<Identity>,
    pub resolved: ResolvedDimensions,
    pub context: Option<RequestContext>,
    pub canonical: CanonicalDimensions,
}

impl ScopedRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            route: RouteDescriptor::default(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            identity: None,
            resolved: ResolvedDimensions::default(),
            context: None,
            canonical: CanonicalDimensions::default(),
        }
    }

    pub fn with_route(mut self, route: RouteDescriptor) -> Self {
        self.route = route;
        self
    }

    /// Add a header; invalid names or values are ignored
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::debug!("Skipping invalid header {}", name),
        }
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_raw_query(mut self, raw: Option<&str>) -> Self {
        self.query = parse_query(raw);
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// First trimmed, non-empty value of header `name`
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.header_values(name).into_iter().next()
    }

    /// Every trimmed, non-empty value sent for header `name`, in order
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Host without port, from the Host header
    pub fn host(&self) -> Option<String> {
        let host = self.header_value(header::HOST.as_str())?;
        let host = host.rsplit_once(':').map(|(h, _)| h.to_string()).unwrap_or(host);
        Some(host.to_ascii_lowercase())
    }

    /// Every non-empty value supplied for `key` in the query string
    pub fn query_values(&self, key: &str) -> Vec<String> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Every value supplied for `field` in the JSON body.
    ///
    /// Objects contribute their field; arrays contribute the field of each object
    /// element. Null and blank strings count as absent. Non-scalar values are kept
    /// in their JSON text form so they can never compare equal to an identifier.
    pub fn body_values(&self, field: &str) -> Vec<String> {
        match &self.body {
            RequestBody::Json(Value::Object(map)) => map.get(field).and_then(scalar_value).into_iter().collect(),
            RequestBody::Json(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object())
                .filter_map(|map| map.get(field).and_then(scalar_value))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().and_then(|i| i.user_id.as_deref())
    }
}

/// Parse a raw query string into ordered pairs
pub fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    })
    .unwrap_or_default()
}

fn scalar_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
