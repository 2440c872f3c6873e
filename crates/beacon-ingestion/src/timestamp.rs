//! Timestamp normalization to Unix milliseconds.
//!
//! Accepts RFC 3339 strings or epoch numbers. The unit of a number is inferred
//! from its magnitude:
//!
//! | magnitude | unit |
//! |-----------|------|
//! | `< 1e10` | seconds |
//! | `< 1e13` | milliseconds |
//! | otherwise | nanoseconds |
//!
//! Values near the thresholds are ambiguous (a seconds value from the far
//! future reads as milliseconds). The thresholds are kept exactly for
//! compatibility with existing producers.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Numbers below this are seconds
pub const SECONDS_UPPER_BOUND: f64 = 1e10;

/// Numbers below this (and not seconds) are milliseconds
pub const MILLIS_UPPER_BOUND: f64 = 1e13;

/// Convert an epoch number of unknown unit to milliseconds
pub fn epoch_to_millis(value: f64) -> i64 {
    if value < SECONDS_UPPER_BOUND {
        (value * 1_000.0) as i64
    } else if value < MILLIS_UPPER_BOUND {
        value as i64
    } else {
        (value / 1_000_000.0) as i64
    }
}

/// Normalize an optional JSON timestamp. Missing, unparseable or non-finite
/// input falls back to `now`.
pub fn normalize_timestamp(value: Option<&Value>, now: DateTime<Utc>) -> i64 {
    let fallback = now.timestamp_millis();
    match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(fallback),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() => epoch_to_millis(v),
            _ => fallback,
        },
        _ => fallback,
    }
}

/// Parse an OTLP-style nanosecond field, which may be a number or a decimal
/// string. Falls back to `now`.
pub fn nanos_field_to_millis(value: Option<&Value>, now: DateTime<Utc>) -> i64 {
    match value {
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => epoch_to_millis(v),
            _ => now.timestamp_millis(),
        },
        other => normalize_timestamp(other, now),
    }
}
