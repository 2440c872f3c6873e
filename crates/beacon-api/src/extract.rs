//! Request extraction shared by the ingestion handlers: the project scope
//! and the payload, which arrives either as a JSON body or a query string.

use axum::extract::{FromRequestParts, Query};
use axum::http::{header::HeaderName, request::Parts, Method, Uri};
use beacon_core::{sanitize, ProjectId, SanitizationError};
use serde_json::{Map, Value};

use crate::ApiError;

/// Header carrying the project scope
pub static PROJECT_HEADER: HeaderName = HeaderName::from_static("x-project-id");

/// Query key carrying the project scope. Never part of the payload.
pub const PROJECT_QUERY_KEY: &str = "project";

/// Optional project scope of a request, strictly sanitized.
///
/// The header wins over the query key. Blank values mean "unscoped"; any
/// other value that fails sanitization rejects the request with 400.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectScope(pub Option<ProjectId>);

impl ProjectScope {
    pub fn into_inner(self) -> Option<ProjectId> {
        self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ProjectScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = match parts.headers.get(&PROJECT_HEADER) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| {
                        SanitizationError::new(
                            "project_id",
                            "<binary>",
                            "header is not visible ASCII",
                        )
                    })?
                    .to_string(),
            ),
            None => query_pairs(&parts.uri)?
                .into_iter()
                .find(|(key, _)| key == PROJECT_QUERY_KEY)
                .map(|(_, value)| value),
        };

        scope_from(raw.as_deref()).map(ProjectScope)
    }
}

/// Strictly sanitize an optional raw scope
pub fn scope_from(raw: Option<&str>) -> Result<Option<ProjectId>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(sanitize::project_id(value)?)),
    }
}

/// Decoded query-string pairs, in request order
pub fn query_pairs(uri: &Uri) -> Result<Vec<(String, String)>, ApiError> {
    Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// The adapter payload of a request. `GET` builds it from the query string,
/// every other method parses the body as JSON.
pub fn payload_from_request(method: &Method, uri: &Uri, body: &[u8]) -> Result<Value, ApiError> {
    if method == Method::GET {
        return Ok(query_payload(query_pairs(uri)?));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::InvalidFormat)
}

/// Payload keys the adapters read as text; a query value for them is never coerced
const TEXT_KEYS: [&str; 15] = [
    "environment",
    "event_name",
    "hash",
    "level",
    "logger",
    "message",
    "metric_name",
    "name",
    "path",
    "platform",
    "referrer",
    "release",
    "type",
    "url",
    "user_agent",
];

/// Build a JSON object from query pairs. Identifier keys (`id`, `*_id`,
/// `*Id`) and [`TEXT_KEYS`] stay strings; every other value goes through
/// [`coerce_scalar`].
pub fn query_payload(pairs: Vec<(String, String)>) -> Value {
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter(|(key, _)| key != PROJECT_QUERY_KEY)
        .map(|(key, raw)| {
            let value = if is_identifier_key(&key) || TEXT_KEYS.contains(&key.as_str()) {
                Value::String(raw)
            } else {
                coerce_scalar(&raw)
            };
            (key, value)
        })
        .collect();
    Value::Object(map)
}

fn is_identifier_key(key: &str) -> bool {
    key == "id" || key.ends_with("_id") || key.ends_with("Id")
}

/// Booleans, finite numbers and inline JSON objects/arrays become typed
/// values; anything else stays a string.
pub fn coerce_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return value;
        }
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(float) = trimmed.parse::<f64>().ok().filter(|f| f.is_finite()) {
        return Value::from(float);
    }
    Value::String(raw.to_string())
}
