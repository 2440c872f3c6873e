//! Read side: SQL endpoint returning newline-delimited JSON rows.

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{config::QueryCredentials, Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

/// One sampled row as returned by the query endpoint.
///
/// `sample_interval` is the number of real events the row stands for. The
/// endpoint may encode numbers as strings; both are accepted. A missing or
/// unusable interval counts as 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub index1: Option<String>,
    #[serde(default)]
    pub blob1: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub double1: Option<f64>,
    #[serde(
        rename = "_sample_interval",
        default = "default_sample_interval",
        deserialize_with = "lenient_interval"
    )]
    pub sample_interval: u64,
    /// Any further columns (`double2`, `blob2`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RawRow {
    /// Row with the columns the insight engine reads
    pub fn new(
        timestamp: impl Into<String>,
        index1: Option<&str>,
        double1: f64,
        sample_interval: u64,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            index1: index1.map(str::to_string),
            blob1: None,
            double1: Some(double1),
            sample_interval: sample_interval.max(1),
            extra: serde_json::Map::new(),
        }
    }
}

fn default_sample_interval() -> u64 {
    1
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_of).filter(|n| n.is_finite()))
}

fn lenient_interval<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_of)
        .filter(|n| n.is_finite() && *n >= 1.0)
        .map(|n| n as u64)
        .unwrap_or(1))
}

/// Parse a newline-delimited JSON body, skipping blank lines
pub fn parse_ndjson(body: &str) -> Result<Vec<RawRow>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<RawRow>(line).map_err(Error::from))
        .collect()
}

/// Executes SQL text against the sink
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<RawRow>>;
}

/// Client for the account-scoped SQL endpoint
#[derive(Debug, Clone)]
pub struct SqlQueryClient {
    url: String,
    credentials: QueryCredentials,
    client: reqwest::Client,
}

impl SqlQueryClient {
    pub fn new(endpoint: &str, credentials: QueryCredentials, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::connection(e.to_string()))?;

        let url = format!(
            "{}/accounts/{}/analytics_engine/sql",
            endpoint.trim_end_matches('/'),
            credentials.account_id
        );

        Ok(Self {
            url,
            credentials,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QueryBackend for SqlQueryClient {
    #[instrument(skip(self, sql), fields(url = %self.url))]
    async fn execute(&self, sql: &str) -> Result<Vec<RawRow>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.credentials.api_token)
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout
                } else {
                    Error::connection(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "Query endpoint error");
            return Err(Error::query_failed(status.as_u16(), body));
        }

        let rows = parse_ndjson(&body)?;
        debug!(rows = rows.len(), "Query returned rows");
        Ok(rows)
    }
}
