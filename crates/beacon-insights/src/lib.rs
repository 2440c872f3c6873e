//! # Beacon Insights
//!
//! The read path: sanitized query construction against the sink's SQL
//! endpoint, sampling-corrected aggregation, trend and anomaly detection.
//!
//! ```text
//! InsightParams -> QueryPlan (sanitized) -> SQL -> QueryBackend -> RawRow[]
//!               -> aggregate -> analysis -> InsightResult
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms)]

pub mod aggregate;
pub mod analysis;
pub mod engine;
pub mod query;
pub mod recommendations;

pub use engine::{InsightEngine, InsightResult};
pub use query::{InsightParams, QueryLimits, QueryPlan, DATASETS};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analysis::{Anomaly, Severity, Trend, TrendDirection};
    pub use crate::engine::{InsightEngine, InsightResult};
    pub use crate::query::{InsightParams, QueryLimits, QueryPlan, DATASETS};
}
