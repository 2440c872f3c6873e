//! Query construction from untrusted parameters.
//!
//! Every value that reaches the SQL text has been through
//! [`beacon_core::sanitize`] first. The project filter uses the lenient
//! form, so an unsafe identifier drops the filter rather than failing the
//! query.

use beacon_core::{sanitize, ProjectId, Result, SanitizationError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Datasets that may be queried; each is also the table name
pub const DATASETS: [&str; 7] = [
    "telemetry_events",
    "token_usage",
    "error_reports",
    "web_analytics",
    "interaction_events",
    "app_logs",
    "self_observation",
];

/// Dataset used when the caller names none
pub const DEFAULT_DATASET: &str = "telemetry_events";

/// Window used when the caller gives neither `start` nor `hours`
pub const DEFAULT_WINDOW_HOURS: f64 = 24.0;

/// Raw query parameters as received from a caller
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InsightParams {
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default, alias = "projectId", alias = "project")]
    pub project_id: Option<String>,
    /// RFC 3339 window start
    #[serde(default)]
    pub start: Option<String>,
    /// RFC 3339 window end, defaults to now
    #[serde(default)]
    pub end: Option<String>,
    /// Explicit window, used when `start` is absent
    #[serde(default)]
    pub hours: Option<f64>,
    /// Number or numeric string
    #[serde(default)]
    pub limit: Option<Value>,
}

/// Bounds applied while planning
#[derive(Debug, Clone)]
pub struct QueryLimits {
    pub max_row_limit: u64,
    pub max_window_hours: u64,
    /// Replaces the dataset's table; still whitelisted
    pub table_override: Option<String>,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_row_limit: sanitize::DEFAULT_MAX_ROW_LIMIT,
            max_window_hours: sanitize::DEFAULT_MAX_WINDOW_HOURS,
            table_override: None,
        }
    }
}

impl From<&beacon_core::config::QueryConfig> for QueryLimits {
    fn from(config: &beacon_core::config::QueryConfig) -> Self {
        Self {
            max_row_limit: config.max_row_limit,
            max_window_hours: config.max_window_hours,
            table_override: config.table_override.clone(),
        }
    }
}

/// A fully sanitized query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub dataset: &'static str,
    pub table: &'static str,
    pub hours: u64,
    pub project: Option<ProjectId>,
    pub limit: u64,
}

fn parse_instant(field: &'static str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SanitizationError::new(field, raw, "must be an RFC 3339 timestamp").into())
}

/// Window length in (possibly fractional) hours
fn requested_hours(params: &InsightParams, now: DateTime<Utc>) -> Result<f64> {
    let Some(start) = params.start.as_deref() else {
        return Ok(params.hours.unwrap_or(DEFAULT_WINDOW_HOURS));
    };
    let start = parse_instant("start", start)?;
    let end = match params.end.as_deref() {
        Some(end) => parse_instant("end", end)?,
        None => now,
    };
    Ok((end - start).num_seconds() as f64 / 3_600.0)
}

impl QueryPlan {
    /// Sanitize `params` into a plan
    pub fn from_params(
        params: &InsightParams,
        limits: &QueryLimits,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let requested = params.dataset.as_deref().unwrap_or(DEFAULT_DATASET);
        let dataset = sanitize::table_name(requested, &DATASETS)?;
        let table = match limits.table_override.as_deref() {
            Some(table) => sanitize::table_name(table, &DATASETS)?,
            None => dataset,
        };

        let hours = sanitize::window_hours(requested_hours(params, now)?, limits.max_window_hours)?;
        let limit = sanitize::row_limit(params.limit.as_ref(), limits.max_row_limit)?;
        let project = sanitize::project_id_lenient(params.project_id.as_deref());

        Ok(Self {
            dataset,
            table,
            hours,
            project,
            limit,
        })
    }

    /// SQL text for the plan. Only sanitized values are interpolated.
    pub fn to_sql(&self) -> String {
        let filter = self
            .project
            .as_ref()
            .map(|project| format!(" AND index1 = '{project}'"))
            .unwrap_or_default();

        format!(
            "SELECT timestamp, index1, blob1, double1, _sample_interval \
             FROM {table} \
             WHERE timestamp > NOW() - INTERVAL '{hours}' HOUR{filter} \
             ORDER BY timestamp ASC \
             LIMIT {limit} \
             FORMAT JSONEachRow",
            table = self.table,
            hours = self.hours,
            limit = self.limit,
        )
    }
}
