//! Static recommendations keyed by dataset.

/// Points required before any recommendation is given
pub const MIN_POINTS: usize = 2;

const RULES: &[(&str, &[&str])] = &[
    (
        "token_usage",
        &[
            "Set budget alerts on token spend to catch cost spikes early",
            "Review the highest-volume projects for prompt caching opportunities",
        ],
    ),
    (
        "error_reports",
        &["Triage the most frequent error types first and link them to recent releases"],
    ),
    (
        "web_analytics",
        &["Compare traffic against campaign dates to attribute changes in volume"],
    ),
    (
        "interaction_events",
        &["Exclude high bot-score sessions before drawing conclusions from click data"],
    ),
    (
        "app_logs",
        &["Alert on sustained increases in error-level log volume"],
    ),
    (
        "self_observation",
        &["Watch p95 latency and 5xx rates of the ingestion endpoints"],
    ),
    (
        "telemetry_events",
        &["Track event volume per project to spot silent integrations"],
    ),
];

/// Recommendations for `dataset`; empty below [`MIN_POINTS`]
pub fn recommendations(dataset: &str, points: usize) -> Vec<String> {
    if points < MIN_POINTS {
        return Vec::new();
    }
    RULES
        .iter()
        .find(|(name, _)| *name == dataset)
        .map(|(_, texts)| texts.iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}
