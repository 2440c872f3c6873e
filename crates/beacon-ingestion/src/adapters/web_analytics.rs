//! Measurement-protocol style web analytics.
//!
//! ```json
//! { "client_id": "123.456", "events": [{ "name": "page_view", "params": { "page": "/" } }] }
//! ```

use beacon_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    has_any_key, json_record, non_empty, parse_as, AdapterKind, FormatAdapter, InvalidFormat,
    TransformContext,
};

/// Events accepted in one payload
pub const MAX_EVENTS: usize = 25;

#[derive(Debug, Deserialize, Serialize)]
struct AnalyticsEvent {
    name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    params: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsPayload {
    client_id: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    timestamp_micros: Option<Value>,
    events: Vec<AnalyticsEvent>,
}

impl AnalyticsPayload {
    fn is_valid(&self) -> bool {
        non_empty(&self.client_id)
            && (1..=MAX_EVENTS).contains(&self.events.len())
            && self.events.iter().all(|e| non_empty(&e.name))
    }
}

#[derive(Debug, Serialize)]
struct AnalyticsBlob<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_micros: Option<&'a Value>,
    events: &'a [AnalyticsEvent],
}

/// Adapter for `{client_id, events[]}` payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct WebAnalyticsAdapter;

impl WebAnalyticsAdapter {
    fn parse(payload: &Value) -> Option<AnalyticsPayload> {
        parse_as::<AnalyticsPayload>(payload).filter(AnalyticsPayload::is_valid)
    }
}

impl FormatAdapter for WebAnalyticsAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::WebAnalytics
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["client_id"]) && has_any_key(payload, &["events"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let parsed = Self::parse(payload).ok_or(InvalidFormat)?;
        let blob = AnalyticsBlob {
            kind: "web_analytics",
            client_id: &parsed.client_id,
            user_id: parsed.user_id.as_deref(),
            timestamp_micros: parsed.timestamp_micros.as_ref(),
            events: &parsed.events,
        };
        json_record(ctx, vec![parsed.events.len() as f64], &blob)
    }
}
