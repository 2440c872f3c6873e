//! Whitelisting and bounding of untrusted values before they reach a query.
//!
//! Every validator here is pure. The strict forms return
//! [`SanitizationError`] carrying the field name and the offending value; the
//! lenient project form returns `None`, which query construction interprets
//! as "omit this filter".

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Row limit used when the caller supplies none
pub const DEFAULT_ROW_LIMIT: u64 = 10_000;

/// Default upper bound for row limits
pub const DEFAULT_MAX_ROW_LIMIT: u64 = 100_000;

/// Default upper bound for time windows (one year)
pub const DEFAULT_MAX_WINDOW_HOURS: u64 = 8_760;

/// Longest offending value echoed back in an error
const MAX_ECHOED_VALUE: usize = 64;

static SQL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|UNION|EXEC|EXECUTE)\b")
        .expect("static regex")
});

static SQL_METACHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['";\\]|--|/\*|\*/"#).expect("static regex"));

static TIMING_FUNCTIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(SLEEP|BENCHMARK|WAITFOR)\b").expect("static regex"));

static PROJECT_ID_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]{3,32}$").expect("static regex"));

static TABLE_NAME_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("static regex"));

/// A rejected untrusted value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct SanitizationError {
    /// Parameter that was rejected
    pub field: &'static str,
    /// The offending value (shortened)
    pub value: String,
    /// Human-readable reason
    pub reason: String,
}

impl SanitizationError {
    pub fn new(field: &'static str, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        let value = value.to_string();
        let value = crate::record::truncate_utf8(&value, MAX_ECHOED_VALUE).to_string();
        Self {
            field,
            value,
            reason: reason.into(),
        }
    }
}

/// A project scope that passed sanitization: `^[a-z0-9-]{3,32}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strict project identifier sanitization.
///
/// Trims whitespace, then rejects SQL keywords, metacharacters and comment
/// sequences, timing functions, and finally anything outside the canonical
/// shape.
pub fn project_id(raw: &str) -> Result<ProjectId, SanitizationError> {
    const FIELD: &str = "project_id";
    let trimmed = raw.trim();

    if SQL_KEYWORDS.is_match(trimmed) {
        return Err(SanitizationError::new(FIELD, raw, "contains SQL keywords"));
    }
    if SQL_METACHARACTERS.is_match(trimmed) {
        return Err(SanitizationError::new(
            FIELD,
            raw,
            "contains SQL metacharacters or comment sequences",
        ));
    }
    if TIMING_FUNCTIONS.is_match(trimmed) {
        return Err(SanitizationError::new(
            FIELD,
            raw,
            "contains timing functions",
        ));
    }
    if !PROJECT_ID_SHAPE.is_match(trimmed) {
        return Err(SanitizationError::new(
            FIELD,
            raw,
            "must be 3-32 characters of lowercase letters, digits and hyphens",
        ));
    }

    Ok(ProjectId(trimmed.to_string()))
}

/// Lenient project identifier sanitization: any rejection yields `None`.
pub fn project_id_lenient(raw: Option<&str>) -> Option<ProjectId> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    match project_id(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(field = e.field, reason = %e.reason, "Dropping unsafe filter value");
            None
        }
    }
}

/// Row limit: number or numeric string, positive integer, at most `max`.
/// Absent, JSON null or a blank string means [`DEFAULT_ROW_LIMIT`] capped at `max`.
pub fn row_limit(raw: Option<&serde_json::Value>, max: u64) -> Result<u64, SanitizationError> {
    const FIELD: &str = "limit";
    use serde_json::Value;

    let parsed = match raw {
        None | Some(Value::Null) => return Ok(DEFAULT_ROW_LIMIT.min(max)),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(DEFAULT_ROW_LIMIT.min(max)),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    let value = match parsed {
        Some(v) if v.is_finite() => v,
        _ => {
            return Err(SanitizationError::new(
                FIELD,
                raw.map(|v| v.to_string()).unwrap_or_default(),
                "must be a number",
            ))
        }
    };

    if value.fract() != 0.0 || value < 1.0 {
        return Err(SanitizationError::new(
            FIELD,
            value,
            "must be a positive integer",
        ));
    }
    if value > max as f64 {
        return Err(SanitizationError::new(
            FIELD,
            value,
            format!("must not exceed {max}"),
        ));
    }

    Ok(value as u64)
}

/// Time window in hours: finite, non-negative, at most `max`. Fractions round up.
pub fn window_hours(hours: f64, max: u64) -> Result<u64, SanitizationError> {
    const FIELD: &str = "hours";

    if !hours.is_finite() {
        return Err(SanitizationError::new(FIELD, hours, "must be finite"));
    }
    if hours < 0.0 {
        return Err(SanitizationError::new(FIELD, hours, "must not be negative"));
    }
    let rounded = hours.ceil();
    if rounded > max as f64 {
        return Err(SanitizationError::new(
            FIELD,
            hours,
            format!("must not exceed {max}"),
        ));
    }

    Ok(rounded as u64)
}

/// Table name: member of `whitelist` and shaped `^[a-z0-9_]+$`.
pub fn table_name<'a>(name: &str, whitelist: &[&'a str]) -> Result<&'a str, SanitizationError> {
    const FIELD: &str = "table";

    let allowed = whitelist
        .iter()
        .copied()
        .find(|candidate| *candidate == name)
        .ok_or_else(|| SanitizationError::new(FIELD, name, "is not an allowed table"))?;

    if !TABLE_NAME_SHAPE.is_match(allowed) {
        return Err(SanitizationError::new(
            FIELD,
            name,
            "must contain only lowercase letters, digits and underscores",
        ));
    }

    Ok(allowed)
}
