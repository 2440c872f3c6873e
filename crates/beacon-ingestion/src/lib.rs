//! # Beacon Ingestion
//!
//! The write path of the telemetry pipeline:
//!
//! ```text
//! payload -> AdapterRegistry::detect -> FormatAdapter::validate
//!         -> FormatAdapter::transform -> Record -> WriteService (retry) -> Sink
//! ```
//!
//! - [`adapters`]: one adapter per wire format plus structural detection
//! - [`writer`]: validate / transform / bounded-retry write
//! - [`timestamp`]: epoch and RFC 3339 normalization to milliseconds
//! - [`useragent`]: client classification used by the interaction adapter

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod adapters;
pub mod timestamp;
pub mod useragent;
pub mod writer;

pub use adapters::{AdapterKind, AdapterRegistry, FormatAdapter, InvalidFormat, TransformContext};
pub use writer::{RetryPolicy, WriteAck, WriteError, WriteReceipt, WriteService};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapters::{
        AdapterKind, AdapterRegistry, FormatAdapter, InvalidFormat, SelfObservation,
        TransformContext, DETECTION_ORDER,
    };
    pub use crate::useragent::{ClientClassifier, HeuristicClassifier};
    pub use crate::writer::{RetryPolicy, WriteAck, WriteError, WriteReceipt, WriteService};
}
