//! API route definitions.
//!
//! ## Ingestion
//! - `/v1/ingest` - auto-detected format
//! - `/v1/metrics`, `/v1/events` - legacy
//! - `/v1/otlp/logs`, `/v1/otlp/metrics` - OTLP/JSON
//! - `/v1/collect` - web analytics
//! - `/v1/errors`, `/api/:project/store` - error reports
//! - `/v1/logs` - generic logs
//! - `/v1/track` - interactions
//!
//! ## Read path
//! - `/v1/insights`
//! - `/v1/projects`
//! - `/health`

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use beacon_ingestion::AdapterKind;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::{
    handlers::{health::*, ingest::*, insights::*, projects::*},
    middleware::{cors_middleware, logging_middleware, self_observation_middleware},
    ApiConfig, AppState,
};

/// Create the main API router
pub fn create_router(config: ApiConfig, state: AppState) -> Router {
    let ingest_routes = Router::new()
        .route("/v1/ingest", post(ingest_auto))
        .route("/v1/metrics", adapter_endpoint(AdapterKind::Legacy))
        .route("/v1/events", adapter_endpoint(AdapterKind::Legacy))
        .route("/v1/otlp/logs", adapter_endpoint(AdapterKind::OtlpLogs))
        .route("/v1/otlp/metrics", adapter_endpoint(AdapterKind::OtlpMetrics))
        .route("/v1/collect", adapter_endpoint(AdapterKind::WebAnalytics))
        .route("/v1/errors", adapter_endpoint(AdapterKind::ErrorReport))
        .route(
            "/api/:project/store",
            get(ingest_error_store).post(ingest_error_store),
        )
        .route("/v1/logs", adapter_endpoint(AdapterKind::GenericLog))
        .route("/v1/track", adapter_endpoint(AdapterKind::Interaction));

    let read_routes = Router::new()
        .route("/v1/insights", get(insights_get).post(insights_post))
        .route("/v1/projects", get(list_projects).post(create_project))
        .route("/health", get(health));

    let app = ingest_routes.merge(read_routes);

    let app = if config.self_observation {
        app.layer(middleware::from_fn_with_state(
            state.clone(),
            self_observation_middleware,
        ))
    } else {
        app
    };

    let app = app
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .with_state(state);

    // Add middleware
    let app = if config.enable_logging {
        app.layer(middleware::from_fn(logging_middleware))
    } else {
        app
    };

    let app = if config.enable_cors {
        app.layer(cors_middleware(config.cors_origins))
    } else {
        app
    };

    app.layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use beacon_core::config::{InsightsConfig, SinkKind};
    use beacon_core::Result;
    use beacon_ingestion::{RetryPolicy, WriteService};
    use beacon_insights::{InsightEngine, QueryLimits};
    use beacon_storage::query::{QueryBackend, RawRow};
    use beacon_storage::{MemorySink, Sink};
    use beacon_core::{Error, Record};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    const EVENT_ID: &str = "fc6d8c0c43fc4630ad850ee518f1b9d0";

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

    struct Harness {
        sink: Arc<MemorySink>,
        backend: Arc<RecordingBackend>,
        router: Router,
    }

    fn hourly(values: &[f64]) -> Vec<RawRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| RawRow::new(format!("2024-05-01 {i:02}:00:00"), Some("proj-a"), *v, 1))
            .collect()
    }

    /// How [`ObservationSink`] treats self-observation records
    #[derive(Debug, Clone, Copy)]
    enum ObservationFault {
        Fail,
        Stall,
    }

    /// Stores ingested records but faults on self-observation records,
    /// which are the only ones carrying two doubles
    #[derive(Debug)]
    struct ObservationSink {
        inner: MemorySink,
        fault: ObservationFault,
        observations: AtomicU32,
    }

    impl ObservationSink {
        fn new(fault: ObservationFault) -> Self {
            Self {
                inner: MemorySink::new(),
                fault,
                observations: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Sink for ObservationSink {
        fn name(&self) -> &'static str {
            "observation"
        }

        async fn write(&self, record: &Record) -> Result<()> {
            if record.doubles().len() != 2 {
                return self.inner.write(record).await;
            }
            self.observations.fetch_add(1, Ordering::SeqCst);
            match self.fault {
                ObservationFault::Fail => Err(Error::connection("sink unavailable")),
                ObservationFault::Stall => {
                    tokio::time::sleep(Duration::from_secs(300)).await;
                    Ok(())
                }
            }
        }
    }

    fn observed_router(sink: Arc<ObservationSink>) -> Router {
        let config = ApiConfig {
            self_observation: true,
            ..ApiConfig::default()
        };
        let writer = WriteService::new(
            Some(sink as Arc<dyn Sink>),
            RetryPolicy::new(2, Duration::from_millis(1)),
        );
        let insights = InsightEngine::new(None, QueryLimits::default(), InsightsConfig::default());
        create_router(config, AppState::new(writer, insights, SinkKind::Memory))
    }

    fn harness_with(config: ApiConfig, rows: Vec<RawRow>, bind_sink: bool) -> Harness {
        let sink = Arc::new(MemorySink::new());
        let backend = Arc::new(RecordingBackend {
            rows,
            ..Default::default()
        });

        let bound = bind_sink.then(|| sink.clone() as Arc<dyn Sink>);
        let writer = WriteService::new(bound, RetryPolicy::new(0, Duration::ZERO));
        let insights = InsightEngine::new(
            Some(backend.clone() as Arc<dyn QueryBackend>),
            QueryLimits::default(),
            InsightsConfig::default(),
        );
        let state = AppState::new(writer, insights, SinkKind::Memory);

        Harness {
            sink,
            backend,
            router: create_router(config, state),
        }
    }

    fn harness() -> Harness {
        harness_with(ApiConfig::default(), Vec::new(), true)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn legacy_metric() -> Value {
        json!({ "session_id": "s1", "metric_name": "m", "value": 10 })
    }

    #[tokio::test]
    async fn test_unscoped_legacy_metric() {
        let h = harness();
        let (status, body) = send(&h.router, post_json("/v1/metrics", legacy_metric())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let records = h.sink.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].indexes().is_empty());
        assert_eq!(records[0].doubles(), &[10.0]);
        assert_eq!(records[0].blobs().len(), 1);
    }

    #[tokio::test]
    async fn test_header_scope_becomes_index() {
        let h = harness();
        let mut request = post_json("/v1/metrics", legacy_metric());
        request
            .headers_mut()
            .insert("x-project-id", "myproj".parse().unwrap());

        let (status, _) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::OK);

        let records = h.sink.records().await;
        assert_eq!(records[0].indexes(), &["myproj".to_string()]);
    }

    #[tokio::test]
    async fn test_error_report_without_event_id_is_bad_request() {
        let h = harness();
        let payload =
            json!({ "exception": { "values": [{ "type": "TypeError", "value": "boom" }] } });
        let (status, body) = send(&h.router, post_json("/v1/errors", payload)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["message"], "Invalid data format");
        assert!(h.sink.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_query_string_payload() {
        let h = harness();
        let (status, _) = send(
            &h.router,
            get_request("/v1/metrics?session_id=s1&metric_name=m&value=10&project=web-app"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let records = h.sink.records().await;
        assert_eq!(records[0].doubles(), &[10.0]);
        assert_eq!(records[0].index(), Some("web-app"));
    }

    #[tokio::test]
    async fn test_auto_detect() {
        let h = harness();
        let (status, _) = send(&h.router, post_json("/v1/ingest", legacy_metric())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&h.router, post_json("/v1/ingest", json!({ "foo": 1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid data format");
        assert_eq!(h.sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_path_scoped_error_store() {
        let h = harness();
        let payload = json!({ "event_id": EVENT_ID, "message": "boom" });
        let (status, _) = send(&h.router, post_json("/api/checkout/store", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.sink.records().await[0].index(), Some("checkout"));

        let (status, body) = send(
            &h.router,
            post_json("/api/DROP%20TABLE/store", json!({ "event_id": EVENT_ID })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "project_id");
    }

    #[tokio::test]
    async fn test_missing_sink_is_configuration_error() {
        let h = harness_with(ApiConfig::default(), Vec::new(), false);
        let (status, body) = send(&h.router, post_json("/v1/metrics", legacy_metric())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Configuration Error");
    }

    #[tokio::test]
    async fn test_invalid_payload_wins_over_missing_sink() {
        let h = harness_with(ApiConfig::default(), Vec::new(), false);
        let (status, _) = send(&h.router, post_json("/v1/metrics", json!({ "value": 1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_insights_identical_points() {
        let h = harness_with(ApiConfig::default(), hourly(&[5.0, 5.0]), true);
        let request = get_request("/v1/insights?dataset=telemetry_events");
        let (status, body) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["insights"]["anomalies"], json!([]));
        assert_eq!(body["summary"]["totalEvents"], 2);
    }

    #[tokio::test]
    async fn test_insights_spike() {
        let mut values = vec![10.0; 15];
        values[7] = 100.0;
        let h = harness_with(ApiConfig::default(), hourly(&values), true);
        let (status, body) = send(
            &h.router,
            post_json("/v1/insights", json!({ "dataset": "telemetry_events", "limit": 500 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(!body["insights"]["anomalies"].as_array().unwrap().is_empty());
        assert_eq!(body["query"]["limit"], 500);
    }

    #[tokio::test]
    async fn test_insights_drop_injected_project() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            get_request("/v1/insights?projectId=%27%20OR%20%271%27%3D%271"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["query"].get("projectId").is_none());

        let seen = h.backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].contains("index1 ="));
        assert!(!seen[0].contains("'1'='1"));
    }

    #[tokio::test]
    async fn test_insights_unknown_dataset() {
        let h = harness();
        let (status, body) = send(&h.router, get_request("/v1/insights?dataset=users")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "table");
        assert!(h.backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insights_without_credentials() {
        let writer = WriteService::new(None, RetryPolicy::default());
        let insights = InsightEngine::new(None, QueryLimits::default(), InsightsConfig::default());
        let router = create_router(
            ApiConfig::default(),
            AppState::new(writer, insights, SinkKind::None),
        );

        let (status, body) = send(&router, get_request("/v1/insights")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Configuration Error");
    }

    #[tokio::test]
    async fn test_projects_lifecycle() {
        let h = harness();

        let (status, body) = send(
            &h.router,
            post_json("/v1/projects", json!({ "id": "web-app", "name": "Web" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["id"], "web-app");

        let duplicate = post_json("/v1/projects", json!({ "id": "web-app" }));
        let (status, _) = send(&h.router, duplicate).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&h.router, post_json("/v1/projects", json!({ "id": "a;b" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut request = post_json("/v1/metrics", legacy_metric());
        request
            .headers_mut()
            .insert("x-project-id", "web-app".parse().unwrap());
        send(&h.router, request).await;

        let (status, body) = send(&h.router, get_request("/v1/projects")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["writes"], 1);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = send(&h.router, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sink"], "memory");
        assert_eq!(body["query_configured"], true);
    }

    #[tokio::test]
    async fn test_self_observation_is_written_in_background() {
        let config = ApiConfig {
            self_observation: true,
            ..ApiConfig::default()
        };
        let h = harness_with(config, Vec::new(), true);

        let (status, _) = send(&h.router, post_json("/v1/metrics", legacy_metric())).await;
        assert_eq!(status, StatusCode::OK);

        let mut records = Vec::new();
        for _ in 0..100 {
            records = h.sink.records().await;
            if records.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(records.len(), 2);

        let observation = records
            .iter()
            .find(|r| r.doubles().len() == 2)
            .expect("self-observation record");
        assert_eq!(observation.doubles()[1], 200.0);
        let blob: Value = serde_json::from_str(&observation.blobs()[0]).unwrap();
        assert_eq!(blob["endpoint"], "/v1/metrics");
        assert_eq!(blob["method"], "POST");
    }

    #[tokio::test]
    async fn test_failed_self_observation_never_reaches_caller() {
        let sink = Arc::new(ObservationSink::new(ObservationFault::Fail));
        let router = observed_router(sink.clone());

        for _ in 0..2 {
            let (status, body) = send(&router, post_json("/v1/metrics", legacy_metric())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({ "success": true }));
        }

        // every retry of both background writes hits the sink and fails
        for _ in 0..100 {
            if sink.observations.load(Ordering::SeqCst) == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(sink.observations.load(Ordering::SeqCst), 6);
        assert_eq!(sink.inner.len().await, 2);
    }

    #[tokio::test]
    async fn test_stalled_self_observation_does_not_delay_response() {
        let sink = Arc::new(ObservationSink::new(ObservationFault::Stall));
        let router = observed_router(sink.clone());

        let (status, body) = tokio::time::timeout(
            Duration::from_secs(5),
            send(&router, post_json("/v1/metrics", legacy_metric())),
        )
        .await
        .expect("response held back by the self-observation write");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
        assert_eq!(sink.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_numeric_text_field_stays_string() {
        let h = harness();
        let (status, body) = send(
            &h.router,
            get_request("/v1/metrics?session_id=s1&metric_name=404&value=3"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let records = h.sink.records().await;
        let blob: Value = serde_json::from_str(&records[0].blobs()[0]).unwrap();
        assert_eq!(blob["metric_name"], "404");
    }

    #[tokio::test]
    async fn test_insights_blank_limit_uses_default() {
        let h = harness();
        let (status, body) = send(&h.router, get_request("/v1/insights?limit=")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"]["limit"], 10_000);
    }
}
