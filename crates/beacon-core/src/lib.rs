//! # Beacon Core
//!
//! Shared building blocks for the Beacon telemetry pipeline:
//!
//! - [`record`]: the fixed `{indexes, doubles, blobs}` record written to the sink
//! - [`error`]: the error taxonomy used by the write and read paths
//! - [`sanitize`]: whitelists and bounds for every untrusted query parameter
//! - [`config`]: YAML + environment configuration

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod record;
pub mod sanitize;

pub use error::{Error, Result};
pub use record::Record;
pub use sanitize::{ProjectId, SanitizationError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, InsightsConfig, QueryConfig, QueryCredentials, SinkKind};
    pub use crate::record::Record;
    pub use crate::sanitize::{ProjectId, SanitizationError};
    pub use crate::{Error, Result};
}
