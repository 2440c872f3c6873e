//! Self-observation: one HTTP exchange handled by this service.
//!
//! Written by the API middleware after every response.
//! `doubles` = `[latency_ms, status]`.

use beacon_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    has_any_key, json_record, parse_as, AdapterKind, FormatAdapter, InvalidFormat, TransformContext,
};

/// One handled request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfObservation {
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SelfObservation {
    fn is_valid(&self) -> bool {
        self.endpoint.starts_with('/')
            && !self.method.trim().is_empty()
            && (100..=599).contains(&self.status)
            && self.latency_ms.is_finite()
            && self.latency_ms >= 0.0
    }

    /// JSON payload accepted by [`SelfObservationAdapter`]
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Serialize)]
struct ObservationBlob<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: i64,
    #[serde(flatten)]
    observation: &'a SelfObservation,
}

/// Adapter for [`SelfObservation`] payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfObservationAdapter;

impl SelfObservationAdapter {
    fn parse(payload: &Value) -> Option<SelfObservation> {
        parse_as::<SelfObservation>(payload).filter(SelfObservation::is_valid)
    }
}

impl FormatAdapter for SelfObservationAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::SelfObservation
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["endpoint"]) && has_any_key(payload, &["latency_ms"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let observation = Self::parse(payload).ok_or(InvalidFormat)?;
        let blob = ObservationBlob {
            kind: "self_observation",
            timestamp: ctx.received_at.timestamp_millis(),
            observation: &observation,
        };
        json_record(
            ctx,
            vec![observation.latency_ms, f64::from(observation.status)],
            &blob,
        )
    }
}
