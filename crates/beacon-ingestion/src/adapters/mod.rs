//! # Format Adapters
//!
//! One adapter per inbound wire family. Every adapter turns an untyped JSON
//! payload into a [`Record`]:
//!
//! - **legacy**: simple `{session_id, metric_name, value}` metrics and events
//! - **otlp**: OTLP/JSON log and metric exports
//! - **web_analytics**: measurement-protocol style `{client_id, events}`
//! - **error_report**: error events keyed by a 32-hex `event_id`
//! - **generic_log**: one or many `{message, dt?, level?}` entries
//! - **interaction**: first-party pageview / click events with a fingerprint
//! - **self_observation**: one HTTP exchange handled by this service
//!
//! ## Dispatch
//!
//! No format tag travels on the wire. Each adapter exposes a cheap
//! structural [`FormatAdapter::matches`] predicate and the
//! [`AdapterRegistry`] tries them in [`DETECTION_ORDER`], taking the first
//! match. Validation and transformation return values; nothing panics and
//! every rule failure collapses into [`InvalidFormat`].
//!
//! Per-request state (the project scope, the receive time) travels in a
//! [`TransformContext`] argument. Adapters hold no mutable state.

pub mod error_report;
pub mod generic_log;
pub mod interaction;
pub mod legacy;
pub mod otlp;
pub mod self_observation;
pub mod web_analytics;

pub use error_report::ErrorReportAdapter;
pub use generic_log::GenericLogAdapter;
pub use interaction::InteractionAdapter;
pub use legacy::LegacyAdapter;
pub use otlp::{OtlpLogsAdapter, OtlpMetricsAdapter};
pub use self_observation::{SelfObservation, SelfObservationAdapter};
pub use web_analytics::WebAnalyticsAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use beacon_core::{ProjectId, Record};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::useragent::{ClientClassifier, HeuristicClassifier};

/// The single refusal every adapter reports, whichever rule failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid data format")]
pub struct InvalidFormat;

impl From<InvalidFormat> for beacon_core::Error {
    fn from(_: InvalidFormat) -> Self {
        beacon_core::Error::InvalidFormat
    }
}

/// Per-request values an adapter may use while transforming
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Sanitized project scope, written to `indexes[0]`
    pub scope: Option<ProjectId>,
    /// Fallback for payloads without a usable timestamp
    pub received_at: DateTime<Utc>,
}

impl TransformContext {
    pub fn new(scope: Option<ProjectId>) -> Self {
        Self {
            scope,
            received_at: Utc::now(),
        }
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Index value for the record
    pub fn index(&self) -> Option<&str> {
        self.scope.as_ref().map(ProjectId::as_str)
    }
}

impl Default for TransformContext {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Identifies an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Legacy,
    OtlpLogs,
    OtlpMetrics,
    WebAnalytics,
    ErrorReport,
    GenericLog,
    Interaction,
    SelfObservation,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 8] = [
        AdapterKind::Legacy,
        AdapterKind::OtlpLogs,
        AdapterKind::OtlpMetrics,
        AdapterKind::WebAnalytics,
        AdapterKind::ErrorReport,
        AdapterKind::GenericLog,
        AdapterKind::Interaction,
        AdapterKind::SelfObservation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Legacy => "legacy",
            AdapterKind::OtlpLogs => "otlp_logs",
            AdapterKind::OtlpMetrics => "otlp_metrics",
            AdapterKind::WebAnalytics => "web_analytics",
            AdapterKind::ErrorReport => "error_report",
            AdapterKind::GenericLog => "generic_log",
            AdapterKind::Interaction => "interaction",
            AdapterKind::SelfObservation => "self_observation",
        }
    }

    /// Dataset the adapter's records are queried back from
    pub fn dataset(&self) -> &'static str {
        match self {
            AdapterKind::Legacy | AdapterKind::OtlpLogs | AdapterKind::OtlpMetrics => {
                "telemetry_events"
            }
            AdapterKind::WebAnalytics => "web_analytics",
            AdapterKind::ErrorReport => "error_reports",
            AdapterKind::GenericLog => "app_logs",
            AdapterKind::Interaction => "interaction_events",
            AdapterKind::SelfObservation => "self_observation",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdapterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown format '{s}'"))
    }
}

/// Validate and transform one wire format
pub trait FormatAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> AdapterKind;

    /// Cheap structural check used for auto-detection. A match does not
    /// imply the payload is valid.
    fn matches(&self, payload: &Value) -> bool;

    /// Full validation without building a record
    fn validate(&self, payload: &Value) -> bool;

    /// Build the record. Fails with [`InvalidFormat`] exactly when
    /// [`validate`](Self::validate) returns `false`.
    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat>;
}

/// Priority order for auto-detection. More specific shapes come first; the
/// generic log adapter is the catch-all.
pub const DETECTION_ORDER: [AdapterKind; 8] = [
    AdapterKind::OtlpLogs,
    AdapterKind::OtlpMetrics,
    AdapterKind::ErrorReport,
    AdapterKind::WebAnalytics,
    AdapterKind::Interaction,
    AdapterKind::SelfObservation,
    AdapterKind::Legacy,
    AdapterKind::GenericLog,
];

/// Owns one instance of every adapter
#[derive(Debug)]
pub struct AdapterRegistry {
    legacy: LegacyAdapter,
    otlp_logs: OtlpLogsAdapter,
    otlp_metrics: OtlpMetricsAdapter,
    web_analytics: WebAnalyticsAdapter,
    error_report: ErrorReportAdapter,
    generic_log: GenericLogAdapter,
    interaction: InteractionAdapter,
    self_observation: SelfObservationAdapter,
}

impl AdapterRegistry {
    /// Registry using the heuristic client classifier
    pub fn new() -> Self {
        Self::with_classifier(Arc::new(HeuristicClassifier))
    }

    pub fn with_classifier(classifier: Arc<dyn ClientClassifier>) -> Self {
        Self {
            legacy: LegacyAdapter,
            otlp_logs: OtlpLogsAdapter,
            otlp_metrics: OtlpMetricsAdapter,
            web_analytics: WebAnalyticsAdapter,
            error_report: ErrorReportAdapter,
            generic_log: GenericLogAdapter,
            interaction: InteractionAdapter::new(classifier),
            self_observation: SelfObservationAdapter,
        }
    }

    pub fn get(&self, kind: AdapterKind) -> &dyn FormatAdapter {
        match kind {
            AdapterKind::Legacy => &self.legacy,
            AdapterKind::OtlpLogs => &self.otlp_logs,
            AdapterKind::OtlpMetrics => &self.otlp_metrics,
            AdapterKind::WebAnalytics => &self.web_analytics,
            AdapterKind::ErrorReport => &self.error_report,
            AdapterKind::GenericLog => &self.generic_log,
            AdapterKind::Interaction => &self.interaction,
            AdapterKind::SelfObservation => &self.self_observation,
        }
    }

    /// First adapter, in [`DETECTION_ORDER`], whose shape matches
    pub fn detect(&self, payload: &Value) -> Option<&dyn FormatAdapter> {
        DETECTION_ORDER
            .into_iter()
            .map(|kind| self.get(kind))
            .find(|adapter| adapter.matches(payload))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize a typed view of the payload. Type mismatches are refusals.
pub(crate) fn parse_as<T: DeserializeOwned>(payload: &Value) -> Option<T> {
    serde_json::from_value(payload.clone()).ok()
}

/// `true` when the payload is an object carrying any of `keys`
pub(crate) fn has_any_key(payload: &Value, keys: &[&str]) -> bool {
    payload
        .as_object()
        .map(|map| keys.iter().any(|key| map.contains_key(*key)))
        .unwrap_or(false)
}

/// Non-blank string
pub(crate) fn non_empty(value: &str) -> bool {
    !value.trim().is_empty()
}

/// First `n` entries of a map, in payload order
pub(crate) fn first_keys(map: &Map<String, Value>, n: usize) -> Map<String, Value> {
    map.iter()
        .take(n)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Build the record, serializing `blob` as the single JSON blob
pub(crate) fn json_record<S: serde::Serialize>(
    ctx: &TransformContext,
    doubles: Vec<f64>,
    blob: &S,
) -> Result<Record, InvalidFormat> {
    let blob = serde_json::to_value(blob).map_err(|_| InvalidFormat)?;
    Ok(Record::with_json_blob(ctx.index(), doubles, &blob))
}
