//! The insight engine: plan, query, aggregate, analyze.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::config::{InsightsConfig, QueryConfig};
use beacon_core::{Error, Result};
use beacon_storage::query::{QueryBackend, RawRow, SqlQueryClient};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::aggregate::{self, ProjectTotal, TimePoint};
use crate::analysis::{self, Anomaly, Trend};
use crate::query::{InsightParams, QueryLimits, QueryPlan};
use crate::recommendations;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// `Σ _sample_interval` over all rows
    pub total_events: u64,
    pub top_projects: Vec<ProjectTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightData {
    pub timeseries: Vec<TimePoint>,
    /// Weighted total per project, in first-appearance order
    pub breakdown: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub trends: Vec<Trend>,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<String>,
}

/// What was actually queried, after sanitization
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    pub dataset: &'static str,
    pub table: &'static str,
    pub hours: u64,
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub rows: usize,
}

/// Derived, never stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightResult {
    pub summary: Summary,
    pub data: InsightData,
    pub insights: Insights,
    pub query: QueryMeta,
}

/// Read path over the sink's query endpoint
#[derive(Clone)]
pub struct InsightEngine {
    backend: Option<Arc<dyn QueryBackend>>,
    limits: QueryLimits,
    config: InsightsConfig,
}

impl fmt::Debug for InsightEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsightEngine")
            .field("configured", &self.is_configured())
            .field("limits", &self.limits)
            .field("config", &self.config)
            .finish()
    }
}

impl InsightEngine {
    pub fn new(
        backend: Option<Arc<dyn QueryBackend>>,
        limits: QueryLimits,
        config: InsightsConfig,
    ) -> Self {
        Self {
            backend,
            limits,
            config,
        }
    }

    /// Build from configuration. Missing credentials leave the engine
    /// unconfigured; every query then fails with
    /// [`Error::CredentialsNotConfigured`].
    pub fn from_config(query: &QueryConfig, insights: &InsightsConfig) -> Result<Self> {
        let backend = match query.credentials()? {
            Some(credentials) => {
                let client = SqlQueryClient::new(
                    &query.endpoint,
                    credentials,
                    Duration::from_secs(query.timeout_secs),
                )?;
                info!(url = client.url(), "Query endpoint configured");
                Some(Arc::new(client) as Arc<dyn QueryBackend>)
            }
            None => {
                info!("Query credentials not configured, insights disabled");
                None
            }
        };
        Ok(Self::new(backend, QueryLimits::from(query), insights.clone()))
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// Plan, execute and analyze one query
    #[instrument(skip_all, fields(dataset = ?params.dataset))]
    pub async fn get_insights(&self, params: &InsightParams) -> Result<InsightResult> {
        let backend = self.backend.as_ref().ok_or(Error::CredentialsNotConfigured)?;
        let plan = QueryPlan::from_params(params, &self.limits, Utc::now())?;
        let rows = backend.execute(&plan.to_sql()).await?;
        info!(table = plan.table, rows = rows.len(), "Query executed");
        Ok(self.analyze(&plan, &rows))
    }

    /// Derive the insight result from rows already fetched for `plan`
    pub fn analyze(&self, plan: &QueryPlan, rows: &[RawRow]) -> InsightResult {
        let totals = aggregate::breakdown(rows);
        let series = aggregate::timeseries(rows);

        let trends = analysis::detect_trend(&series, self.config.trend_dead_band_pct)
            .into_iter()
            .collect();
        let anomalies = analysis::detect_anomalies(&series, self.config.zscore_threshold);
        let recommendations = recommendations::recommendations(plan.dataset, series.len());

        InsightResult {
            summary: Summary {
                total_events: aggregate::weighted_total(rows),
                top_projects: aggregate::top_projects(&totals, self.config.top_projects),
            },
            data: InsightData {
                timeseries: series,
                breakdown: totals
                    .into_iter()
                    .map(|t| (t.project, Value::from(t.events)))
                    .collect(),
            },
            insights: Insights {
                trends,
                anomalies,
                recommendations,
            },
            query: QueryMeta {
                dataset: plan.dataset,
                table: plan.table,
                hours: plan.hours,
                limit: plan.limit,
                project_id: plan.project.as_ref().map(|p| p.to_string()),
                rows: rows.len(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns canned rows and records every SQL text it receives
    #[derive(Debug, Default)]
    struct RecordingBackend {
        rows: Vec<RawRow>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryBackend for RecordingBackend {
        async fn execute(&self, sql: &str) -> Result<Vec<RawRow>> {
            self.seen.lock().unwrap().push(sql.to_string());
            Ok(self.rows.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl QueryBackend for FailingBackend {
        async fn execute(&self, _sql: &str) -> Result<Vec<RawRow>> {
            Err(Error::query_failed(422, "bad column"))
        }
    }

    fn engine(backend: Arc<dyn QueryBackend>) -> InsightEngine {
        InsightEngine::new(Some(backend), QueryLimits::default(), InsightsConfig::default())
    }

    fn hourly(values: &[f64]) -> Vec<RawRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawRow::new(format!("2024-05-01 {i:02}:00:00"), Some("proj-a"), *v, 1))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_credentials_is_hard_error() {
        let engine = InsightEngine::new(None, QueryLimits::default(), InsightsConfig::default());
        let err = engine.get_insights(&InsightParams::default()).await.unwrap_err();
        assert!(matches!(err, Error::CredentialsNotConfigured));
    }

    #[tokio::test]
    async fn test_identical_points_have_no_anomalies() {
        let backend = Arc::new(RecordingBackend {
            rows: hourly(&[5.0, 5.0]),
            ..Default::default()
        });
        let result = engine(backend).get_insights(&InsightParams::default()).await.unwrap();
        assert!(result.insights.anomalies.is_empty());
        assert_eq!(result.insights.trends.len(), 1);
        assert_eq!(result.insights.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_spike_among_baseline_is_anomalous() {
        let mut values = vec![10.0; 15];
        values[9] = 100.0;
        let backend = Arc::new(RecordingBackend {
            rows: hourly(&values),
            ..Default::default()
        });
        let result = engine(backend).get_insights(&InsightParams::default()).await.unwrap();
        assert!(!result.insights.anomalies.is_empty());
        assert_eq!(result.insights.anomalies[0].value, 100.0);
    }

    #[tokio::test]
    async fn test_injected_project_is_not_embedded() {
        let backend = Arc::new(RecordingBackend::default());
        let params = InsightParams {
            project_id: Some("' OR '1'='1".to_string()),
            ..Default::default()
        };
        let result = engine(backend.clone()).get_insights(&params).await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].contains("index1 ="));
        assert!(result.query.project_id.is_none());
    }

    #[tokio::test]
    async fn test_query_failure_propagates() {
        let err = engine(Arc::new(FailingBackend))
            .get_insights(&InsightParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryFailed { status: 422, .. }));
    }

    #[test]
    fn test_result_shape() {
        let engine = InsightEngine::new(None, QueryLimits::default(), InsightsConfig::default());
        let plan = QueryPlan::from_params(
            &InsightParams {
                dataset: Some("token_usage".to_string()),
                ..Default::default()
            },
            &QueryLimits::default(),
            Utc::now(),
        )
        .unwrap();
        let rows = vec![
            RawRow::new("t1", Some("a"), 2.0, 10),
            RawRow::new("t2", Some("b"), 50.0, 1),
            RawRow::new("t3", Some("a"), 1.0, 5),
        ];
        let result = engine.analyze(&plan, &rows);

        assert_eq!(result.summary.total_events, 16);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["summary"]["totalEvents"], 16);
        assert_eq!(json["summary"]["topProjects"][0]["project"], "b");
        assert_eq!(json["data"]["breakdown"], json!({ "a": 25.0, "b": 50.0 }));
        assert_eq!(json["data"]["timeseries"].as_array().unwrap().len(), 3);
        assert_eq!(json["insights"]["trends"][0]["metric"], "event_volume");
        assert_eq!(json["query"]["table"], "token_usage");
        assert!(json["insights"]["recommendations"][0]
            .as_str()
            .unwrap()
            .contains("budget"));
    }
}
