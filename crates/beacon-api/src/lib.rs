//! # Beacon API
//!
//! HTTP surface of the telemetry pipeline, built on axum.
//!
//! ## Ingestion
//! - `POST /v1/ingest` - auto-detected format
//! - `GET|POST /v1/metrics`, `/v1/events` - legacy metrics and events
//! - `GET|POST /v1/otlp/logs`, `/v1/otlp/metrics` - OTLP/JSON exports
//! - `GET|POST /v1/collect` - web analytics
//! - `GET|POST /v1/errors`, `/api/:project/store` - error reports
//! - `GET|POST /v1/logs` - generic logs
//! - `GET|POST /v1/track` - first-party interactions
//!
//! ## Read path
//! - `GET|POST /v1/insights`
//! - `GET|POST /v1/projects`
//! - `GET /health`

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod projects;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use beacon_core::{config::Config, Error, Result};
use serde::Serialize;

pub use error::ApiError;
pub use state::AppState;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub timeout_secs: u64,
    pub max_body_size: usize,
    pub enable_logging: bool,
    /// Record every handled request through the write path
    pub self_observation: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            timeout_secs: 30,
            max_body_size: 1024 * 1024,
            enable_logging: true,
            self_observation: false,
        }
    }
}

impl ApiConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid server address: {e}")))?;

        Ok(Self {
            bind_addr,
            enable_cors: !config.server.cors_origins.is_empty(),
            cors_origins: config.server.cors_origins.clone(),
            timeout_secs: config.server.request_timeout_secs,
            max_body_size: config.server.max_body_bytes,
            enable_logging: true,
            self_observation: config.self_observation.enabled,
        })
    }
}

/// Success envelope for non-ingestion endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error body: `{error, message?, field?}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            field: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::projects::{InMemoryProjectStore, ProjectRecord, ProjectStore};
    pub use crate::routes::create_router;
    pub use crate::state::AppState;
    pub use crate::{ApiConfig, ApiError, ErrorResponse, SuccessResponse};
}
