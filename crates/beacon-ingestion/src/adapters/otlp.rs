//! OTLP/JSON log and metric exports.
//!
//! Both envelopes nest `resource -> scope -> items`. Field names follow the
//! protobuf JSON mapping (`resourceLogs`, `timeUnixNano`, ...); the
//! snake_case spellings some exporters emit are accepted as aliases.
//!
//! Logs store `[record_count, error_count]`, metrics store
//! `[data_point_count, value_sum]`. Only sum and gauge data points are read.

use beacon_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    has_any_key, json_record, parse_as, AdapterKind, FormatAdapter, InvalidFormat, TransformContext,
};
use crate::timestamp::nanos_field_to_millis;

/// Log records kept in the blob; the counts in `doubles` cover all of them
const MAX_BLOB_LOG_RECORDS: usize = 20;

/// Data points kept per metric in the blob
const MAX_BLOB_POINTS: usize = 10;

/// OTLP severity number where ERROR begins
const SEVERITY_ERROR: i64 = 17;

#[derive(Debug, Default, Deserialize)]
struct KeyValue {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
struct Resource {
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
struct Scope {
    #[serde(default)]
    name: Option<String>,
}

/// Flatten an OTLP `AnyValue` (`{"stringValue": ..}`, `{"intValue": ..}`, ...)
/// into plain JSON
fn any_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };
    let Some((key, inner)) = map.iter().next() else {
        return Value::Null;
    };
    match key.as_str() {
        "stringValue" | "string_value" | "boolValue" | "bool_value" | "doubleValue"
        | "double_value" | "bytesValue" | "bytes_value" => inner.clone(),
        // int64 is encoded as a decimal string in OTLP/JSON
        "intValue" | "int_value" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| inner.clone()),
            other => other.clone(),
        },
        "arrayValue" | "array_value" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(any_value).collect())
                .unwrap_or_default(),
        ),
        "kvlistValue" | "kvlist_value" => Value::Object(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|kv| {
                            let key = kv.get("key")?.as_str()?.to_string();
                            Some((key, kv.get("value").map(any_value).unwrap_or(Value::Null)))
                        })
                        .collect()
                })
                .unwrap_or_default(),
        ),
        _ => value.clone(),
    }
}

fn attributes(kvs: &[KeyValue]) -> Map<String, Value> {
    kvs.iter()
        .filter(|kv| !kv.key.is_empty())
        .map(|kv| (kv.key.clone(), any_value(&kv.value)))
        .collect()
}

fn service_name(resource: &Resource) -> Option<String> {
    resource
        .attributes
        .iter()
        .find(|kv| kv.key == "service.name")
        .and_then(|kv| any_value(&kv.value).as_str().map(str::to_string))
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsExport {
    #[serde(alias = "resource_logs")]
    resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceLogs {
    #[serde(default)]
    resource: Resource,
    #[serde(default, alias = "scope_logs")]
    scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeLogs {
    #[serde(default)]
    scope: Scope,
    #[serde(default, alias = "log_records")]
    log_records: Vec<LogRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    #[serde(default, alias = "time_unix_nano")]
    time_unix_nano: Option<Value>,
    #[serde(default, alias = "severity_number")]
    severity_number: Option<i64>,
    #[serde(default, alias = "severity_text")]
    severity_text: Option<String>,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

impl LogRecord {
    fn is_error(&self) -> bool {
        self.severity_number.map(|n| n >= SEVERITY_ERROR).unwrap_or(false)
            || self
                .severity_text
                .as_deref()
                .map(|s| matches!(s.to_ascii_uppercase().as_str(), "ERROR" | "FATAL"))
                .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
struct LogEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<String>,
    body: Value,
    #[serde(skip_serializing_if = "Map::is_empty")]
    attributes: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct LogsBlob {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    record_count: usize,
    error_count: usize,
    records: Vec<LogEntry>,
}

/// Adapter for `resourceLogs` exports
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpLogsAdapter;

impl OtlpLogsAdapter {
    fn parse(payload: &Value) -> Option<LogsExport> {
        parse_as::<LogsExport>(payload).filter(|export| !export.resource_logs.is_empty())
    }
}

impl FormatAdapter for OtlpLogsAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::OtlpLogs
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["resourceLogs", "resource_logs"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let export = Self::parse(payload).ok_or(InvalidFormat)?;

        let mut record_count = 0;
        let mut error_count = 0;
        let mut records = Vec::new();
        let mut first_service = None;

        for resource_logs in &export.resource_logs {
            let service = service_name(&resource_logs.resource);
            if first_service.is_none() {
                first_service = service.clone();
            }
            for scope_logs in &resource_logs.scope_logs {
                for log in &scope_logs.log_records {
                    record_count += 1;
                    if log.is_error() {
                        error_count += 1;
                    }
                    if records.len() < MAX_BLOB_LOG_RECORDS {
                        records.push(LogEntry {
                            service: service.clone(),
                            scope: scope_logs.scope.name.clone(),
                            timestamp: nanos_field_to_millis(
                                log.time_unix_nano.as_ref(),
                                ctx.received_at,
                            ),
                            severity: log.severity_text.clone(),
                            body: any_value(&log.body),
                            attributes: attributes(&log.attributes),
                        });
                    }
                }
            }
        }

        let blob = LogsBlob {
            kind: "otlp_logs",
            service: first_service,
            record_count,
            error_count,
            records,
        };
        json_record(ctx, vec![record_count as f64, error_count as f64], &blob)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricsExport {
    #[serde(alias = "resource_metrics")]
    resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMetrics {
    #[serde(default)]
    resource: Resource,
    #[serde(default, alias = "scope_metrics")]
    scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Deserialize)]
struct ScopeMetrics {
    #[serde(default)]
    metrics: Vec<Metric>,
}

#[derive(Debug, Deserialize)]
struct Metric {
    #[serde(default)]
    name: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    sum: Option<PointSet>,
    #[serde(default)]
    gauge: Option<PointSet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointSet {
    #[serde(default, alias = "data_points")]
    data_points: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    #[serde(default, alias = "as_double")]
    as_double: Option<Value>,
    #[serde(default, alias = "as_int")]
    as_int: Option<Value>,
    #[serde(default, alias = "time_unix_nano")]
    time_unix_nano: Option<Value>,
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

impl DataPoint {
    fn value(&self) -> f64 {
        let raw = self.as_double.as_ref().or(self.as_int.as_ref());
        let value = match raw {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        value.filter(|v: &f64| v.is_finite()).unwrap_or(0.0)
    }
}

#[derive(Debug, Serialize)]
struct PointEntry {
    value: f64,
    timestamp: i64,
    #[serde(skip_serializing_if = "Map::is_empty")]
    attributes: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct MetricEntry {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    kind: &'static str,
    points: Vec<PointEntry>,
}

#[derive(Debug, Serialize)]
struct MetricsBlob {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    point_count: usize,
    value_sum: f64,
    metrics: Vec<MetricEntry>,
}

/// Adapter for `resourceMetrics` exports
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpMetricsAdapter;

impl OtlpMetricsAdapter {
    fn parse(payload: &Value) -> Option<MetricsExport> {
        parse_as::<MetricsExport>(payload).filter(|export| !export.resource_metrics.is_empty())
    }
}

impl FormatAdapter for OtlpMetricsAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::OtlpMetrics
    }

    fn matches(&self, payload: &Value) -> bool {
        has_any_key(payload, &["resourceMetrics", "resource_metrics"])
    }

    fn validate(&self, payload: &Value) -> bool {
        Self::parse(payload).is_some()
    }

    fn transform(&self, payload: &Value, ctx: &TransformContext) -> Result<Record, InvalidFormat> {
        let export = Self::parse(payload).ok_or(InvalidFormat)?;

        let mut point_count = 0;
        let mut value_sum = 0.0;
        let mut metrics = Vec::new();
        let mut first_service = None;

        for resource_metrics in &export.resource_metrics {
            if first_service.is_none() {
                first_service = service_name(&resource_metrics.resource);
            }
            for scope_metrics in &resource_metrics.scope_metrics {
                for metric in &scope_metrics.metrics {
                    let sets = [("sum", metric.sum.as_ref()), ("gauge", metric.gauge.as_ref())];
                    for (kind, set) in sets {
                        let Some(set) = set else { continue };
                        let mut points = Vec::new();
                        for point in &set.data_points {
                            let value = point.value();
                            point_count += 1;
                            value_sum += value;
                            if points.len() < MAX_BLOB_POINTS {
                                points.push(PointEntry {
                                    value,
                                    timestamp: nanos_field_to_millis(
                                        point.time_unix_nano.as_ref(),
                                        ctx.received_at,
                                    ),
                                    attributes: attributes(&point.attributes),
                                });
                            }
                        }
                        metrics.push(MetricEntry {
                            name: metric.name.clone(),
                            unit: metric.unit.clone(),
                            kind,
                            points,
                        });
                    }
                }
            }
        }

        let blob = MetricsBlob {
            kind: "otlp_metrics",
            service: first_service,
            point_count,
            value_sum,
            metrics,
        };
        json_record(ctx, vec![point_count as f64, value_sum], &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logs_payload() -> Value {
        json!({
            "resourceLogs": [{
                "resource": { "attributes": [
                    { "key": "service.name", "value": { "stringValue": "checkout" } }
                ]},
                "scopeLogs": [{
                    "scope": { "name": "app" },
                    "logRecords": [
                        {
                            "timeUnixNano": "1700000000000000000",
                            "severityText": "INFO",
                            "severityNumber": 9,
                            "body": { "stringValue": "started" }
                        },
                        {
                            "timeUnixNano": "1700000001000000000",
                            "severityText": "ERROR",
                            "severityNumber": 17,
                            "body": { "stringValue": "failed" },
                            "attributes": [{ "key": "retry", "value": { "intValue": "3" } }]
                        }
                    ]
                }]
            }]
        })
    }

    #[test]
    fn test_logs_counts_and_blob() {
        let record = OtlpLogsAdapter
            .transform(&logs_payload(), &TransformContext::default())
            .unwrap();
        assert_eq!(record.doubles(), &[2.0, 1.0]);

        let blob: Value = serde_json::from_str(&record.blobs()[0]).unwrap();
        assert_eq!(blob["service"], "checkout");
        assert_eq!(blob["records"][0]["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(blob["records"][1]["body"], "failed");
        assert_eq!(blob["records"][1]["attributes"]["retry"], 3);
    }

    #[test]
    fn test_logs_snake_case_aliases() {
        let payload = json!({
            "resource_logs": [{
                "scope_logs": [{ "log_records": [{ "body": { "string_value": "hi" } }] }]
            }]
        });
        let record = OtlpLogsAdapter
            .transform(&payload, &TransformContext::default())
            .unwrap();
        assert_eq!(record.doubles(), &[1.0, 0.0]);
    }

    #[test]
    fn test_metrics_sum_and_gauge() {
        let payload = json!({
            "resourceMetrics": [{
                "resource": { "attributes": [
                    { "key": "service.name", "value": { "stringValue": "api" } }
                ]},
                "scopeMetrics": [{
                    "metrics": [
                        {
                            "name": "requests",
                            "unit": "1",
                            "sum": { "dataPoints": [{ "asInt": "4" }, { "asInt": 6 }] }
                        },
                        {
                            "name": "cpu",
                            "gauge": { "dataPoints": [{ "asDouble": 0.5 }] }
                        },
                        { "name": "latency", "histogram": { "dataPoints": [{ "count": 3 }] } }
                    ]
                }]
            }]
        });
        let record = OtlpMetricsAdapter
            .transform(&payload, &TransformContext::default())
            .unwrap();
        assert_eq!(record.doubles(), &[3.0, 10.5]);

        let blob: Value = serde_json::from_str(&record.blobs()[0]).unwrap();
        assert_eq!(blob["service"], "api");
        assert_eq!(blob["metrics"][0]["kind"], "sum");
        assert_eq!(blob["metrics"][1]["kind"], "gauge");
    }

    #[test]
    fn test_empty_or_malformed_envelopes_rejected() {
        assert!(!OtlpLogsAdapter.validate(&json!({ "resourceLogs": [] })));
        assert!(!OtlpLogsAdapter.validate(&json!({ "resourceLogs": "nope" })));
        assert!(!OtlpMetricsAdapter.validate(&json!({ "resourceMetrics": [] })));
        assert!(!OtlpMetricsAdapter.validate(&json!({ "resourceMetrics": {} })));
    }

    #[test]
    fn test_any_value_flattening() {
        let nested = json!({
            "kvlistValue": { "values": [
                { "key": "a", "value": { "boolValue": true } },
                { "key": "b", "value": { "arrayValue": { "values": [{ "doubleValue": 1.5 }] } } }
            ]}
        });
        assert_eq!(any_value(&nested), json!({ "a": true, "b": [1.5] }));
    }
}
