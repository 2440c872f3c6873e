//! Shared handler state.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::config::{Config, SinkKind};
use beacon_core::{sanitize, Error, ProjectId, Result};
use beacon_ingestion::{AdapterRegistry, RetryPolicy, WriteService};
use beacon_insights::InsightEngine;
use beacon_storage::http::{HttpSink, HttpSinkConfig};
use beacon_storage::{MemorySink, Sink};
use tracing::info;

use crate::projects::{InMemoryProjectStore, ProjectStore};

/// State cloned into every handler. Everything behind it is either
/// immutable or internally synchronized.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
    pub writer: WriteService,
    pub insights: InsightEngine,
    pub projects: Arc<dyn ProjectStore>,
    pub sink_kind: SinkKind,
    /// Scope attached to self-observation records
    pub self_observation_scope: Option<ProjectId>,
}

impl AppState {
    pub fn new(writer: WriteService, insights: InsightEngine, sink_kind: SinkKind) -> Self {
        Self {
            registry: Arc::new(AdapterRegistry::new()),
            writer,
            insights,
            projects: Arc::new(InMemoryProjectStore::new()),
            sink_kind,
            self_observation_scope: None,
        }
    }

    pub fn with_project_store(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = projects;
        self
    }

    pub fn with_self_observation_scope(mut self, scope: Option<ProjectId>) -> Self {
        self.self_observation_scope = scope;
        self
    }

    /// Wire the sink, write service and insight engine from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let sink = build_sink(config)?;
        let writer = WriteService::new(sink, RetryPolicy::from(&config.sink));
        let insights = InsightEngine::from_config(&config.query, &config.insights)?;

        let scope = config
            .self_observation
            .project
            .as_deref()
            .map(sanitize::project_id)
            .transpose()?;

        Ok(Self::new(writer, insights, config.sink.kind).with_self_observation_scope(scope))
    }
}

/// Sink for the configured kind; `None` leaves the write path unbound
pub fn build_sink(config: &Config) -> Result<Option<Arc<dyn Sink>>> {
    let sink: Option<Arc<dyn Sink>> = match config.sink.kind {
        SinkKind::Memory => Some(Arc::new(MemorySink::new())),
        SinkKind::Http => {
            let url = config
                .sink
                .write_url
                .clone()
                .ok_or_else(|| Error::config("sink.write_url is required for the http sink"))?;
            let mut http = HttpSinkConfig::new(url);
            http.api_token = match config.sink.write_token() {
                Some(token) => Some(token),
                None => config.query.credentials()?.map(|c| c.api_token),
            };
            http.timeout = Duration::from_secs(config.sink.write_timeout_secs);
            Some(Arc::new(HttpSink::new(http)?))
        }
        SinkKind::None => None,
    };

    info!(kind = config.sink.kind.as_str(), "Sink configured");
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let state = AppState::from_config(&Config::default()).unwrap();
        assert_eq!(state.writer.sink_name(), Some("memory"));
        assert!(!state.insights.is_configured());
        assert!(state.self_observation_scope.is_none());
    }

    #[test]
    fn test_none_sink_is_unbound() {
        let mut config = Config::default();
        config.sink.kind = SinkKind::None;
        assert!(build_sink(&config).unwrap().is_none());
    }

    #[test]
    fn test_bad_self_observation_scope_is_rejected() {
        let mut config = Config::default();
        config.self_observation.project = Some("Bad Scope!".into());
        assert!(matches!(
            AppState::from_config(&config),
            Err(Error::Sanitization(_))
        ));
    }

    #[test]
    fn test_http_sink_with_own_token() {
        let mut config = Config::default();
        config.sink.kind = SinkKind::Http;
        config.sink.write_url = Some("http://sink.local/write".into());
        config.sink.api_token = Some("sink-tok".into());

        let sink = build_sink(&config).unwrap().unwrap();
        assert_eq!(sink.name(), "http");
    }
}
