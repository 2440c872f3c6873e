//! Error-report events.
//!
//! An `event_id` of 32 lowercase hex characters is mandatory. Everything else
//! is optional and trimmed so the blob stays under the sink's ceiling:
//! stack traces keep their first 10 frames, breadcrumbs their last 5, and
//! `extra` its first 10 keys.
//!
//! `exception` and `breadcrumbs` may be given either as a bare list or
//! wrapped as `{"values": [...]}`.

use beacon_core::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    first_keys, has_any_key, json_record, parse_as, AdapterKind, FormatAdapter, InvalidFormat,
    TransformContext,
};
use crate::timestamp::normalize_timestamp;

pub const MAX_FRAMES: usize = 10;
pub const MAX_BREADCRUMBS: usize = 5;
pub const MAX_EXTRA_KEYS: usize = 10;

static EVENT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("static regex"));

/// `[...]` or `{"values": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValueList<T> {
    Bare(Vec<T>),
    Wrapped { values: Vec<T> },
}

impl<T> ValueList<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ValueList::Bare(items) | ValueList::Wrapped { values: items } => items,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Stacktrace {
    #[serde(default)]
    frames: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Exception {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    stacktrace: Option<Stacktrace>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    event_id: String,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    logger: Option<String>,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    exception: Option<ValueList<Exception>>,
    #[serde(default)]
    breadcrumbs: Option<ValueList<Value>>,
    #[serde(default)]
    user: Option<Map<String, Value>>,
    #[serde(default)]
    request: Option<Map<String, Value>>,
    #[serde(default)]
    tags: Option<Value>,
    #[serde(default)]
    extra: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct ExceptionEntry {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    frames: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ErrorBlob {
    #[serde(rename = "type")]
    kind: &'static str,
    event_id: String,
    timestamp: i64,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    release: Option<String>,
    exceptions: Vec<ExceptionEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    breadcrumbs: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
}

/// Adapter for error-report events
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReportAdapter;

impl ErrorReportAdapter {
    fn parse(payload: &Value) -> Option<ErrorEvent> {
        parse_as::<ErrorEvent>(payload).filter(|event| EVENT_ID.is_match(&event.event_id))
    }
}

impl FormatAdapter for ErrorReportAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::ErrorReport
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["event_id", "exception"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let event = Self::parse(payload).ok_or(InvalidFormat)?;

        let exceptions: Vec<ExceptionEntry> = event
            .exception
            .map(ValueList::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(|e| ExceptionEntry {
                kind: e.kind,
                value: e.value,
                module: e.module,
                frames: e
                    .stacktrace
                    .unwrap_or_default()
                    .frames
                    .into_iter()
                    .take(MAX_FRAMES)
                    .collect(),
            })
            .collect();

        let mut breadcrumbs = event.breadcrumbs.map(ValueList::into_vec).unwrap_or_default();
        let skip = breadcrumbs.len().saturating_sub(MAX_BREADCRUMBS);
        breadcrumbs.drain(..skip);

        let exception_count = exceptions.len() as f64;
        let blob = ErrorBlob {
            kind: "error_report",
            event_id: event.event_id,
            timestamp: normalize_timestamp(event.timestamp.as_ref(), ctx.received_at),
            level: event.level.unwrap_or_else(|| "error".to_string()),
            platform: event.platform,
            message: event.message,
            logger: event.logger,
            environment: event.environment,
            release: event.release,
            exceptions,
            breadcrumbs,
            user: event.user,
            request: event.request,
            tags: event.tags,
            extra: event
                .extra
                .map(|extra| first_keys(&extra, MAX_EXTRA_KEYS))
                .unwrap_or_default(),
        };

        json_record(ctx, vec![1.0, exception_count], &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VALID_ID: &str = "fc6d8c0c43fc4630ad850ee518f1b9d0";

    #[test]
    fn test_missing_or_malformed_event_id() {
        let cases = [
            json!({ "message": "boom", "exception": [] }),
            json!({ "event_id": "FC6D8C0C43FC4630AD850EE518F1B9D0" }),
            json!({ "event_id": "fc6d8c0c-43fc-4630-ad85-0ee518f1b9d0" }),
            json!({ "event_id": "abc" }),
            json!({ "event_id": 12345 }),
        ];
        for payload in cases {
            assert!(!ErrorReportAdapter.validate(&payload), "accepted {payload}");
        }
    }

    #[test]
    fn test_minimal_event() {
        let payload = json!({ "event_id": VALID_ID, "timestamp": "2024-01-01T00:00:00Z" });
        let record = ErrorReportAdapter
            .transform(&payload, &TransformContext::default())
            .unwrap();
        assert_eq!(record.doubles(), &[1.0, 0.0]);

        let blob: Value = serde_json::from_str(&record.blobs()[0]).unwrap();
        assert_eq!(blob["timestamp"], 1_704_067_200_000_i64);
        assert_eq!(blob["level"], "error");
    }

    #[test]
    fn test_trimming() {
        let frames: Vec<Value> = (0..30).map(|i| json!({ "lineno": i })).collect();
        let crumbs: Vec<Value> = (0..12).map(|i| json!({ "message": format!("c{i}") })).collect();
        let mut extra = Map::new();
        for i in 0..25 {
            extra.insert(format!("k{i:02}"), json!(i));
        }

        let payload = json!({
            "event_id": VALID_ID,
            "exception": { "values": [
                { "type": "ValueError", "value": "bad", "stacktrace": { "frames": frames } },
                { "type": "KeyError" }
            ]},
            "breadcrumbs": { "values": crumbs },
            "extra": extra,
            "user": { "id": "u1" }
        });

        let record = ErrorReportAdapter
            .transform(&payload, &TransformContext::default())
            .unwrap();
        assert_eq!(record.doubles(), &[1.0, 2.0]);

        let blob: Value = serde_json::from_str(&record.blobs()[0]).unwrap();
        let kept_frames = blob["exceptions"][0]["frames"].as_array().unwrap();
        assert_eq!(kept_frames.len(), MAX_FRAMES);
        assert_eq!(kept_frames[0]["lineno"], 0);

        let kept_crumbs = blob["breadcrumbs"].as_array().unwrap();
        assert_eq!(kept_crumbs.len(), MAX_BREADCRUMBS);
        assert_eq!(kept_crumbs[0]["message"], "c7");
        assert_eq!(kept_crumbs[4]["message"], "c11");

        let kept_extra = blob["extra"].as_object().unwrap();
        assert_eq!(kept_extra.len(), MAX_EXTRA_KEYS);
        assert!(kept_extra.contains_key("k00"));
        assert!(!kept_extra.contains_key("k10"));
        assert_eq!(blob["user"]["id"], "u1");
    }

    #[test]
    fn test_bare_exception_list() {
        let payload = json!({
            "event_id": VALID_ID,
            "exception": [{ "type": "TypeError", "value": "x is undefined" }]
        });
        let record = ErrorReportAdapter
            .transform(&payload, &TransformContext::default())
            .unwrap();
        assert_eq!(record.doubles(), &[1.0, 1.0]);
    }
}
