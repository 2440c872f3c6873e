//! Error taxonomy shared by every Beacon crate.
//!
//! The variants map one-to-one onto the recovery policy of the service:
//!
//! | Variant | Who fixes it | Retried |
//! |---------|--------------|---------|
//! | `InvalidFormat` | caller | no |
//! | `Configuration`, `CredentialsNotConfigured` | operator | no |
//! | `SinkWrite` | nobody (already retried) | yes, internally |
//! | `QueryFailed` | operator / sink | no |
//! | `Sanitization` | caller | no |

use thiserror::Error;

use crate::sanitize::SanitizationError;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// An adapter refused the payload. Deliberately carries no detail: every
    /// rule failure is reported the same way.
    #[error("Invalid data format")]
    InvalidFormat,

    /// Missing or unusable binding (sink, endpoint, config file)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Read path requires credentials and none were resolved
    #[error("Query credentials are not configured")]
    CredentialsNotConfigured,

    /// The sink kept failing after every retry
    #[error("Sink write failed after {attempts} attempts: {message}")]
    SinkWrite { attempts: u32, message: String },

    /// Non-2xx answer from the query endpoint
    #[error("Query failed with status {status}: {body}")]
    QueryFailed { status: u16, body: String },

    /// An untrusted value failed its whitelist
    #[error(transparent)]
    Sanitization(#[from] SanitizationError),

    /// Transport-level failure talking to the sink or query endpoint
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport timeout
    #[error("Request timed out")]
    Timeout,

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while loading configuration or secrets
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection(message.into())
    }

    /// Create a query failure from an HTTP status and body
    pub fn query_failed(status: u16, body: impl Into<String>) -> Self {
        Error::QueryFailed {
            status,
            body: body.into(),
        }
    }

    /// Stable machine-readable kind, used in logs and JSON bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidFormat => "invalid_format",
            Error::Configuration(_) => "configuration",
            Error::CredentialsNotConfigured => "credentials_not_configured",
            Error::SinkWrite { .. } => "sink_write_failure",
            Error::QueryFailed { .. } => "query_failure",
            Error::Sanitization(_) => "sanitization_rejection",
            Error::Connection(_) => "connection",
            Error::Timeout => "timeout",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }

    /// Whether a caller could fix the request and try again
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidFormat | Error::Sanitization(_))
    }
}
