//! Legacy simple metric and event payloads.
//!
//! ```json
//! { "session_id": "s1", "metric_name": "latency", "value": 10, "attributes": {} }
//! { "event_name": "login", "timestamp": 1700000000, "session_id": "s1", "attributes": {} }
//! ```
//!
//! A metric stores its value as `doubles[0]`; an event stores a count of 1.

use beacon_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    has_any_key, json_record, non_empty, parse_as, AdapterKind, FormatAdapter, InvalidFormat,
    TransformContext,
};
use crate::timestamp::normalize_timestamp;

#[derive(Debug, Deserialize)]
struct LegacyMetric {
    session_id: String,
    metric_name: String,
    value: f64,
    #[serde(default)]
    attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct LegacyEvent {
    event_name: String,
    timestamp: Value,
    session_id: String,
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyPayload {
    Metric(LegacyMetric),
    Event(LegacyEvent),
}

impl LegacyPayload {
    fn is_valid(&self) -> bool {
        match self {
            LegacyPayload::Metric(m) => non_empty(&m.session_id) && non_empty(&m.metric_name),
            LegacyPayload::Event(e) => {
                non_empty(&e.session_id)
                    && non_empty(&e.event_name)
                    && matches!(e.timestamp, Value::Number(_) | Value::String(_))
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LegacyBlob<'a> {
    Metric {
        session_id: &'a str,
        metric_name: &'a str,
        value: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<&'a Map<String, Value>>,
    },
    Event {
        event_name: &'a str,
        session_id: &'a str,
        timestamp: i64,
        attributes: &'a Map<String, Value>,
    },
}

/// Adapter for legacy metrics and events
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyAdapter;

impl LegacyAdapter {
    fn parse(payload: &Value) -> Option<LegacyPayload> {
        parse_as::<LegacyPayload>(payload).filter(LegacyPayload::is_valid)
    }
}

impl FormatAdapter for LegacyAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Legacy
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["metric_name", "event_name"])
            && has_any_key(payload, &["session_id"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        match Self::parse(payload).ok_or(InvalidFormat)? {
            LegacyPayload::Metric(m) => {
                let blob = LegacyBlob::Metric {
                    session_id: &m.session_id,
                    metric_name: &m.metric_name,
                    value: m.value,
                    attributes: m.attributes.as_ref(),
                };
                json_record(ctx, vec![m.value], &blob)
            }
            LegacyPayload::Event(e) => {
                let blob = LegacyBlob::Event {
                    event_name: &e.event_name,
                    session_id: &e.session_id,
                    timestamp: normalize_timestamp(Some(&e.timestamp), ctx.received_at),
                    attributes: &e.attributes,
                };
                json_record(ctx, vec![1.0], &blob)
            }
        }
    }
}
