//! GET /health

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sink: &'static str,
    /// Whether a sink is bound to the write path
    pub sink_bound: bool,
    pub query_configured: bool,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let sink_bound = state.writer.sink_name().is_some();
    let response = HealthResponse {
        status: if sink_bound { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        sink: state.sink_kind.as_str(),
        sink_bound,
        query_configured: state.insights.is_configured(),
    };
    (StatusCode::OK, Json(response))
}
