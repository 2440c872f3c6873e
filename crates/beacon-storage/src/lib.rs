//! # Beacon Storage
//!
//! The two contracts Beacon has with its analytics store:
//!
//! - [`Sink`]: a single `write(record)` primitive on the append-only log
//! - [`query::QueryBackend`]: an SQL endpoint returning sampled rows
//!
//! Implementations:
//! - [`MemorySink`]: in-process buffer for development and tests
//! - [`http::HttpSink`]: remote write endpoint
//! - [`query::SqlQueryClient`]: newline-delimited JSON SQL endpoint

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod http;
pub mod query;

use async_trait::async_trait;
use beacon_core::{Record, Result};
use tokio::sync::RwLock;
use tracing::debug;

/// Append-only columnar sink
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name for logging
    fn name(&self) -> &'static str;

    /// Append one record
    async fn write(&self, record: &Record) -> Result<()>;
}

/// In-memory sink keeping every record in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<Vec<Record>>,
}

impl MemorySink {
    /// Create an empty memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Number of records written
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        debug!(total = records.len(), "Record appended to memory sink");
        Ok(())
    }
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::http::{HttpSink, HttpSinkConfig};
    pub use crate::query::{QueryBackend, RawRow, SqlQueryClient};
    pub use crate::{MemorySink, Sink};
}
