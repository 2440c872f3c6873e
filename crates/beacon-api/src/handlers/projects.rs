//! Project registry handlers
//!
//! - GET /v1/projects - list known projects
//! - POST /v1/projects - register a project

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use beacon_core::sanitize;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::ApiResult;
use crate::projects::ProjectStoreError;
use crate::{ApiError, AppState, SuccessResponse};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// GET /v1/projects
#[instrument(skip_all)]
pub async fn list_projects(State(state): State<AppState>) -> impl IntoResponse {
    let projects = state.projects.list().await;
    (StatusCode::OK, Json(SuccessResponse::new(projects)))
}

/// POST /v1/projects
#[instrument(skip_all)]
pub async fn create_project(
    State(state): State<AppState>,
    request: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let id = sanitize::project_id(&request.id)?;
    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let project = state
        .projects
        .create(id, name)
        .await
        .map_err(|e| match e {
            ProjectStoreError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
        })?;

    info!(project = %project.id, "Project registered");
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(project))))
}
