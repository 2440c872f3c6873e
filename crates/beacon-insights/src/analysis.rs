//! Trend and anomaly detection over a time series.

use serde::Serialize;

use crate::aggregate::TimePoint;

/// Metric name reported on every trend
pub const TREND_METRIC: &str = "event_volume";

/// Default dead-band, percent of the first value
pub const DEFAULT_DEAD_BAND_PCT: f64 = 5.0;

/// Default |z| above which a point is anomalous
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub metric: &'static str,
    pub direction: TrendDirection,
    pub first: f64,
    pub last: f64,
    /// Relative change; absent when the first value is zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
}

/// Direction from first to last point. `None` with fewer than two points.
///
/// The change is `flat` when it is smaller than `dead_band_pct` percent of
/// the first value. A series starting at zero is flat only if it ends there.
pub fn detect_trend(series: &[TimePoint], dead_band_pct: f64) -> Option<Trend> {
    if series.len() < 2 {
        return None;
    }
    let first = series.first()?.value;
    let last = series.last()?.value;
    let delta = last - first;

    let (direction, change_percent) = if first == 0.0 {
        let direction = if delta > 0.0 {
            TrendDirection::Up
        } else if delta < 0.0 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        };
        (direction, None)
    } else {
        let pct = delta / first.abs() * 100.0;
        let direction = if pct.abs() < dead_band_pct {
            TrendDirection::Flat
        } else if pct > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };
        (direction, Some(pct))
    };

    Some(Trend {
        metric: TREND_METRIC,
        direction,
        first,
        last,
        change_percent,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Grade by how far `z` lies past `threshold`: `low` within one unit,
    /// `medium` within two, `high` beyond
    pub fn from_zscore(z: f64, threshold: f64) -> Self {
        let excess = z - threshold;
        if excess > 2.0 {
            Severity::High
        } else if excess > 1.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub timestamp: String,
    pub value: f64,
    /// Series mean the point deviates from
    pub expected: f64,
    pub z_score: f64,
    pub severity: Severity,
}

/// Mean and population standard deviation
pub fn mean_and_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Points whose |z| exceeds `threshold`.
///
/// A constant series has zero deviation and yields no anomalies.
pub fn detect_anomalies(series: &[TimePoint], threshold: f64) -> Vec<Anomaly> {
    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    let Some((mean, std_dev)) = mean_and_std_dev(&values) else {
        return Vec::new();
    };
    let constant = values.windows(2).all(|w| w[0] == w[1]);
    if std_dev == 0.0 || constant {
        return Vec::new();
    }

    series
        .iter()
        .filter_map(|point| {
            let z = (point.value - mean).abs() / std_dev;
            (z > threshold).then(|| Anomaly {
                timestamp: point.timestamp.clone(),
                value: point.value,
                expected: mean,
                z_score: z,
                severity: Severity::from_zscore(z, threshold),
            })
        })
        .collect()
}
