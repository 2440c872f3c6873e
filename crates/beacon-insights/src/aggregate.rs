//! Sampling-corrected aggregation of raw rows.
//!
//! The sink stores one row for every `_sample_interval` real events, so every
//! count-like figure multiplies by that weight. Rows are never counted
//! directly.

use std::collections::{BTreeMap, HashMap};

use beacon_storage::query::RawRow;
use serde::Serialize;

/// Weighted total for one project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectTotal {
    pub project: String,
    pub events: f64,
}

/// One time-series bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    pub timestamp: String,
    pub value: f64,
}

/// `Σ _sample_interval`
pub fn weighted_total(rows: &[RawRow]) -> u64 {
    rows.iter()
        .fold(0u64, |total, row| total.saturating_add(row.sample_interval))
}

/// `double1 * _sample_interval` summed per `index1`, in order of first
/// appearance. Rows without an index are not attributed to any project.
pub fn breakdown(rows: &[RawRow]) -> Vec<ProjectTotal> {
    let mut totals: Vec<ProjectTotal> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let Some(project) = row.index1.as_deref() else {
            continue;
        };
        let weighted = row.double1.unwrap_or(0.0) * row.sample_interval as f64;
        match positions.get(project) {
            Some(&i) => totals[i].events += weighted,
            None => {
                positions.insert(project, totals.len());
                totals.push(ProjectTotal {
                    project: project.to_string(),
                    events: weighted,
                });
            }
        }
    }

    totals
}

/// Largest `n` totals, descending. Ties keep first-appearance order.
pub fn top_projects(breakdown: &[ProjectTotal], n: usize) -> Vec<ProjectTotal> {
    let mut sorted = breakdown.to_vec();
    // sort_by is stable
    sorted.sort_by(|a, b| b.events.total_cmp(&a.events));
    sorted.truncate(n);
    sorted
}

/// One bucket per distinct timestamp, ordered by timestamp. When several
/// rows share a timestamp the last one wins.
pub fn timeseries(rows: &[RawRow]) -> Vec<TimePoint> {
    let buckets: BTreeMap<&str, f64> = rows
        .iter()
        .map(|row| (row.timestamp.as_str(), row.double1.unwrap_or(0.0)))
        .collect();

    buckets
        .into_iter()
        .map(|(timestamp, value)| TimePoint {
            timestamp: timestamp.to_string(),
            value,
        })
        .collect()
}
