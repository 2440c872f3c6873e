//! Ingestion handlers
//!
//! Every endpoint accepts `POST` with a JSON body and `GET` with the payload
//! spread over the query string:
//! - POST /v1/ingest - format detected from the payload shape
//! - GET|POST /v1/{metrics,events,otlp/logs,otlp/metrics,collect,errors,logs,track}
//! - GET|POST /api/:project/store - error report scoped by path

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{Method, Uri},
    routing::{get, MethodRouter},
    Json,
};
use beacon_core::ProjectId;
use beacon_ingestion::{AdapterKind, TransformContext, WriteAck};
use tracing::{debug, instrument};

use crate::error::ApiResult;
use crate::extract::{payload_from_request, scope_from, ProjectScope};
use crate::{ApiError, AppState};

// =============================================================================
// HANDLERS
// =============================================================================

/// Route accepting `GET` and `POST` for one fixed adapter
pub fn adapter_endpoint(kind: AdapterKind) -> MethodRouter<AppState> {
    let handler = move |State(state): State<AppState>,
                        ProjectScope(scope): ProjectScope,
                        method: Method,
                        uri: Uri,
                        body: Bytes| async move {
        ingest(&state, Some(kind), scope, &method, &uri, &body).await
    };
    get(handler.clone()).post(handler)
}

/// POST /v1/ingest
#[instrument(skip_all)]
pub async fn ingest_auto(
    State(state): State<AppState>,
    ProjectScope(scope): ProjectScope,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Json<WriteAck>> {
    ingest(&state, None, scope, &method, &uri, &body).await
}

/// GET|POST /api/:project/store
///
/// The path segment is the scope; it is sanitized like the header.
#[instrument(skip_all, fields(project = %project))]
pub async fn ingest_error_store(
    State(state): State<AppState>,
    Path(project): Path<String>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> ApiResult<Json<WriteAck>> {
    let scope = scope_from(Some(&project))?;
    ingest(&state, Some(AdapterKind::ErrorReport), scope, &method, &uri, &body).await
}

/// Shared write path: payload, adapter selection, write, project touch
async fn ingest(
    state: &AppState,
    kind: Option<AdapterKind>,
    scope: Option<ProjectId>,
    method: &Method,
    uri: &Uri,
    body: &[u8],
) -> ApiResult<Json<WriteAck>> {
    let payload = payload_from_request(method, uri, body)?;

    let adapter = match kind {
        Some(kind) => state.registry.get(kind),
        None => state
            .registry
            .detect(&payload)
            .ok_or(ApiError::InvalidFormat)?,
    };
    debug!(adapter = %adapter.kind(), "Adapter selected");

    let ctx = TransformContext::new(scope);
    let receipt = state.writer.write(&payload, adapter, &ctx).await?;
    debug!(attempts = receipt.attempts, "Payload ingested");

    if let Some(scope) = ctx.scope.as_ref() {
        state.projects.touch(scope).await;
    }

    Ok(Json(WriteAck::from(&receipt)))
}
