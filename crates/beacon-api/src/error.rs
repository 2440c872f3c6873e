//! Mapping of pipeline errors onto HTTP responses.
//!
//! | Error | Status | `error` |
//! |-------|--------|---------|
//! | invalid payload | 400 | `Bad Request` (`message`: `Invalid data format`) |
//! | sanitization rejection | 400 | `Bad Request` |
//! | missing sink or credentials | 500 | `Configuration Error` |
//! | sink retries exhausted | 502 | `Sink Write Failure` |
//! | non-2xx from the query endpoint | 502 | `Query Failure` |
//! | upstream timeout | 504 | `Gateway Timeout` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use beacon_core::{Error, SanitizationError};
use beacon_ingestion::WriteError;
use thiserror::Error;
use tracing::error;

use crate::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid data format")]
    InvalidFormat,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Sanitization(#[from] SanitizationError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    SinkWrite(String),

    #[error("{0}")]
    QueryFailed(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidFormat | ApiError::BadRequest(_) | ApiError::Sanitization(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Configuration(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SinkWrite(_) | ApiError::QueryFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ApiError::InvalidFormat | ApiError::BadRequest(_) | ApiError::Sanitization(_) => {
                "Bad Request"
            }
            ApiError::NotFound(_) => "Not Found",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Configuration(_) => "Configuration Error",
            ApiError::SinkWrite(_) => "Sink Write Failure",
            ApiError::QueryFailed(_) => "Query Failure",
            ApiError::Timeout(_) => "Gateway Timeout",
            ApiError::Internal(_) => "Internal Server Error",
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::InvalidFormat => ApiError::InvalidFormat,
            WriteError::SinkNotConfigured => ApiError::Configuration(err.to_string()),
            WriteError::Exhausted { .. } => ApiError::SinkWrite(err.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidFormat => ApiError::InvalidFormat,
            Error::Sanitization(e) => ApiError::Sanitization(e),
            Error::Configuration(_) | Error::CredentialsNotConfigured => {
                ApiError::Configuration(err.to_string())
            }
            Error::SinkWrite { .. } => ApiError::SinkWrite(err.to_string()),
            Error::QueryFailed { .. } | Error::Connection(_) => {
                ApiError::QueryFailed(err.to_string())
            }
            Error::Timeout => ApiError::Timeout(err.to_string()),
            Error::Serialization(_) | Error::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let mut body = ErrorResponse::new(self.label()).with_message(self.to_string());
        if let ApiError::Sanitization(e) = &self {
            body.field = Some(e.field);
        }

        (status, Json(body)).into_response()
    }
}

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
