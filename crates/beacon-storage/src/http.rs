//! Remote sink that accepts one JSON record per `POST`.

use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{Error, Record, Result};
use tracing::{debug, instrument, warn};

use crate::Sink;

/// Default timeout for a single write attempt
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP sink configuration
#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    /// Full URL the record is posted to
    pub write_url: String,
    /// Optional bearer token
    pub api_token: Option<String>,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl HttpSinkConfig {
    pub fn new(write_url: impl Into<String>) -> Self {
        Self {
            write_url: write_url.into(),
            api_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Sink writing records to a remote endpoint.
///
/// Performs exactly one attempt per call; retrying is the write service's job.
#[derive(Debug, Clone)]
pub struct HttpSink {
    config: HttpSinkConfig,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(config: HttpSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::connection(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self, record), fields(url = %self.config.write_url))]
    async fn write(&self, record: &Record) -> Result<()> {
        let mut request = self.client.post(&self.config.write_url).json(record);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::connection(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Record written");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Sink rejected record");
        Err(Error::connection(format!("sink returned {}: {}", status.as_u16(), body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/write")
    }

    #[tokio::test]
    async fn test_write_posts_wire_shape() {
        let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let captured = seen.clone();
        let app = Router::new().route(
            "/write",
            post(move |Json(body): Json<serde_json::Value>| {
                let captured = captured.clone();
                async move {
                    captured.lock().unwrap().push(body);
                    StatusCode::NO_CONTENT
                }
            }),
        );
        let url = serve(app).await;

        let sink = HttpSink::new(HttpSinkConfig::new(url)).unwrap();
        let record = Record::new(Some("proj"), vec![3.0], vec!["{}".to_string()]);
        sink.write(&record).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["indexes"][0], "proj");
        assert_eq!(seen[0]["doubles"][0], 3.0);
    }

    #[tokio::test]
    async fn test_non_success_is_error() {
        let app = Router::new().route(
            "/write",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let url = serve(app).await;

        let sink = HttpSink::new(HttpSinkConfig::new(url)).unwrap();
        let err = sink
            .write(&Record::new(None, vec![1.0], Vec::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }
}
