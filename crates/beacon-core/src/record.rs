//! The columnar record written to the analytics sink.
//!
//! A [`Record`] is the only shape that ever reaches storage. It has three
//! ordered columns families with hard ceilings enforced at construction, so
//! a value of this type is always safe to hand to the sink.

use serde::Serialize;

/// Maximum number of indexed (filterable) dimensions
pub const MAX_INDEXES: usize = 1;

/// Maximum byte length of an index value
pub const MAX_INDEX_BYTES: usize = 96;

/// Maximum byte length of a blob value
pub const MAX_BLOB_BYTES: usize = 5_120;

/// Maximum number of numeric columns kept
pub const MAX_DOUBLES: usize = 20;

/// Maximum number of blob columns kept
pub const MAX_BLOBS: usize = 20;

/// Immutable record in the sink's wire shape: `{indexes, doubles, blobs}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    indexes: Vec<String>,
    doubles: Vec<f64>,
    blobs: Vec<String>,
}

impl Record {
    /// Build a record, enforcing every ceiling.
    ///
    /// - at most one index, truncated to [`MAX_INDEX_BYTES`]
    /// - non-finite doubles become `0.0`
    /// - blobs truncated to [`MAX_BLOB_BYTES`]
    pub fn new<D, B>(index: Option<&str>, doubles: D, blobs: B) -> Self
    where
        D: IntoIterator<Item = f64>,
        B: IntoIterator<Item = String>,
    {
        let indexes = index
            .into_iter()
            .take(MAX_INDEXES)
            .map(|i| truncate_utf8(i, MAX_INDEX_BYTES).to_string())
            .collect();

        let doubles = doubles
            .into_iter()
            .take(MAX_DOUBLES)
            .map(finite_or_zero)
            .collect();

        let blobs = blobs
            .into_iter()
            .take(MAX_BLOBS)
            .map(|b| {
                if b.len() > MAX_BLOB_BYTES {
                    truncate_utf8(&b, MAX_BLOB_BYTES).to_string()
                } else {
                    b
                }
            })
            .collect();

        Self {
            indexes,
            doubles,
            blobs,
        }
    }

    /// Convenience for the common adapter output: one JSON blob holding the
    /// normalized payload.
    pub fn with_json_blob(
        index: Option<&str>,
        doubles: Vec<f64>,
        payload: &serde_json::Value,
    ) -> Self {
        Self::new(index, doubles, std::iter::once(payload.to_string()))
    }

    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }

    pub fn doubles(&self) -> &[f64] {
        &self.doubles
    }

    pub fn blobs(&self) -> &[String] {
        &self.blobs
    }

    /// The project scope, when one was written
    pub fn index(&self) -> Option<&str> {
        self.indexes.first().map(String::as_str)
    }
}

/// Coerce NaN and infinities to zero
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Left-anchored truncation to at most `max_bytes`.
///
/// Cuts at the last character boundary at or below the limit, so ASCII input
/// is cut at exactly `max_bytes`.
pub fn truncate_utf8(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
