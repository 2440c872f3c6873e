//! Generic log entries: a single object or a non-empty array of objects,
//! each with a `message` string and optional `dt` and `level`.
//!
//! `doubles[0]` is the number of entries in the payload.

use beacon_core::Record;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{json_record, AdapterKind, FormatAdapter, InvalidFormat, TransformContext};
use crate::timestamp::normalize_timestamp;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Serialize)]
struct LogEntry {
    dt: i64,
    level: String,
    message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct LogBlob {
    #[serde(rename = "type")]
    kind: &'static str,
    entries: Vec<LogEntry>,
}

fn entries(payload: &Value) -> Option<Vec<&Map<String, Value>>> {
    let entries: Vec<&Map<String, Value>> = match payload {
        Value::Object(map) => vec![map],
        Value::Array(items) if !items.is_empty() => {
            items.iter().map(Value::as_object).collect::<Option<_>>()?
        }
        _ => return None,
    };
    entries
        .iter()
        .all(|entry| matches!(entry.get("message"), Some(Value::String(_))))
        .then_some(entries)
}

fn to_entry(map: &Map<String, Value>, ctx: &TransformContext) -> LogEntry {
    let message = map
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let level = map
        .get("level")
        .and_then(Value::as_str)
        .filter(|level| !level.trim().is_empty())
        .unwrap_or(DEFAULT_LEVEL)
        .to_string();
    let fields = map
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "message" | "level" | "dt"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    LogEntry {
        dt: normalize_timestamp(map.get("dt"), ctx.received_at),
        level,
        message,
        fields,
    }
}

/// Adapter for generic log entries
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericLogAdapter;

impl FormatAdapter for GenericLogAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::GenericLog
    }

    fn matches(&self, payload: &Value) -> bool {
        match payload {
            Value::Object(map) => map.contains_key("message"),
            Value::Array(items) => items
                .first()
                .and_then(Value::as_object)
                .map(|first| first.contains_key("message"))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn validate(&self, payload: &Value) -> bool {
        entries(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let entries = entries(payload).ok_or(InvalidFormat)?;
        let blob = LogBlob {
            kind: "log",
            entries: entries.iter().map(|entry| to_entry(entry, ctx)).collect(),
        };
        json_record(ctx, vec![blob.entries.len() as f64], &blob)
    }
}
