//! API request handlers.
//!
//! - Ingestion: one endpoint per wire format plus auto-detection
//! - Insights over the sink's query endpoint
//! - Project registry
//! - Health

pub mod health;
pub mod ingest;
pub mod insights;
pub mod projects;

pub use health::*;
pub use ingest::*;
pub use insights::*;
pub use projects::*;
