//! Request-path middleware: logging, CORS, and self-observation.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use beacon_ingestion::adapters::{AdapterKind, SelfObservation};
use beacon_ingestion::TransformContext;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// Response header echoing the per-request id
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Paths that are never self-observed
const UNOBSERVED_PATHS: [&str; 1] = ["/health"];

/// Log method, path, status and latency under a per-request UUID
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    debug!(%request_id, %method, %path, "Request received");
    let mut response = next.run(req).await;

    info!(
        %request_id,
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(HEADER_REQUEST_ID.clone(), value);
    }
    response
}

/// CORS layer for the configured origins. `*` (or no origins) allows any.
pub fn cors_middleware(origins: Vec<String>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Record the exchange through the write path after the response is built.
///
/// The write is spawned and detached: it never delays or alters the
/// response, and its failures are only logged.
pub async fn self_observation_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let endpoint = req.uri().path().to_string();
    if UNOBSERVED_PATHS.contains(&endpoint.as_str()) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let started = Instant::now();
    let response = next.run(req).await;

    let status = response.status();
    let observation = SelfObservation {
        endpoint,
        method,
        status: status.as_u16(),
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        error: status
            .is_server_error()
            .then(|| status.canonical_reason().unwrap_or("Server Error").to_string()),
    };

    tokio::spawn(async move {
        let payload = observation.to_payload();
        let adapter = state.registry.get(AdapterKind::SelfObservation);
        let ctx = TransformContext::new(state.self_observation_scope.clone());
        if let Err(e) = state.writer.write(&payload, adapter, &ctx).await {
            warn!(
                endpoint = %observation.endpoint,
                error = %e,
                "Self-observation write failed"
            );
        }
    });

    response
}

