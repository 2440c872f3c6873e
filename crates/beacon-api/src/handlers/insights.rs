//! Insight handlers
//!
//! - GET /v1/insights - parameters from the query string
//! - POST /v1/insights - parameters as a JSON body

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use beacon_insights::{InsightParams, InsightResult};
use tracing::{info, instrument};

use crate::error::ApiResult;
use crate::{ApiError, AppState};

/// GET /v1/insights
#[instrument(skip_all)]
pub async fn insights_get(
    State(state): State<AppState>,
    params: Result<Query<InsightParams>, QueryRejection>,
) -> ApiResult<Json<InsightResult>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_insights(&state, &params).await
}

/// POST /v1/insights
#[instrument(skip_all)]
pub async fn insights_post(
    State(state): State<AppState>,
    params: Result<Json<InsightParams>, JsonRejection>,
) -> ApiResult<Json<InsightResult>> {
    let Json(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_insights(&state, &params).await
}

async fn run_insights(state: &AppState, params: &InsightParams) -> ApiResult<Json<InsightResult>> {
    let result = state.insights.get_insights(params).await?;
    info!(
        dataset = result.query.dataset,
        rows = result.query.rows,
        anomalies = result.insights.anomalies.len(),
        "Insights computed"
    );
    Ok(Json(result))
}
