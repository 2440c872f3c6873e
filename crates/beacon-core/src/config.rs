//! Service configuration.
//!
//! Loaded from a YAML file where every field has a default, then overlaid with
//! environment variables. Secrets may be supplied inline or through a file
//! path so they can be mounted by the platform.

use std::{fmt, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    sanitize::{DEFAULT_MAX_ROW_LIMIT, DEFAULT_MAX_WINDOW_HOURS},
    Error, Result,
};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sink: SinkConfig,
    pub query: QueryConfig,
    pub self_observation: SelfObservationConfig,
    pub insights: InsightsConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_origins: Vec<String>,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_origins: vec!["*".to_string()],
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Which sink the write path is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// In-process buffer, useful for development and tests
    Memory,
    /// Remote write endpoint accepting one JSON record per request
    Http,
    /// No binding; every write is a configuration error
    None,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Memory => "memory",
            SinkKind::Http => "http",
            SinkKind::None => "none",
        }
    }
}

impl std::str::FromStr for SinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(SinkKind::Memory),
            "http" => Ok(SinkKind::Http),
            "none" => Ok(SinkKind::None),
            other => Err(Error::config(format!("unknown sink kind: {other}"))),
        }
    }
}

/// Write path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Required when `kind` is `http`
    pub write_url: Option<String>,
    /// Bearer token for the write endpoint; falls back to the query token
    pub api_token: Option<String>,
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Backoff base; the delay before retry `n` is `base * 2^n`
    pub retry_base_delay_ms: u64,
    pub write_timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Memory,
            write_url: None,
            api_token: None,
            max_retries: 3,
            retry_base_delay_ms: 100,
            write_timeout_secs: 10,
        }
    }
}

impl SinkConfig {
    /// Write token, trimmed; blank counts as unset
    pub fn write_token(&self) -> Option<String> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

/// Read path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Base URL of the SQL endpoint
    pub endpoint: String,
    pub account_id: Option<String>,
    /// Plain credential
    pub api_token: Option<String>,
    /// Secret-bound credential; wins over `api_token` when present
    pub api_token_file: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_row_limit: u64,
    pub max_window_hours: u64,
    /// Replaces the dataset's table; still subject to the whitelist
    pub table_override: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cloudflare.com/client/v4".to_string(),
            account_id: None,
            api_token: None,
            api_token_file: None,
            timeout_secs: 30,
            max_row_limit: DEFAULT_MAX_ROW_LIMIT,
            max_window_hours: DEFAULT_MAX_WINDOW_HOURS,
            table_override: None,
        }
    }
}

/// Resolved credentials for the query endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct QueryCredentials {
    pub account_id: String,
    pub api_token: String,
}

impl fmt::Debug for QueryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCredentials")
            .field("account_id", &self.account_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl QueryConfig {
    /// Resolve credentials, reading the secret file when configured.
    ///
    /// Returns `Ok(None)` when either half is missing; the caller decides
    /// whether that is fatal.
    pub fn credentials(&self) -> Result<Option<QueryCredentials>> {
        let account_id = match self.account_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Ok(None),
        };

        let token = match &self.api_token_file {
            Some(path) => {
                let secret = fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("cannot read token file {}: {e}", path.display()))
                })?;
                Some(secret.trim().to_string())
            }
            None => self.api_token.as_deref().map(|t| t.trim().to_string()),
        };

        Ok(token
            .filter(|t| !t.is_empty())
            .map(|api_token| QueryCredentials {
                account_id,
                api_token,
            }))
    }
}

/// Self-observation of this service's own request path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfObservationConfig {
    pub enabled: bool,
    /// Scope written to the self-observation records
    pub project: Option<String>,
}

/// Thresholds for the insight engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    /// Points with |z| above this are anomalies
    pub zscore_threshold: f64,
    /// Changes smaller than this percentage of the first value are `flat`
    pub trend_dead_band_pct: f64,
    /// Size of `summary.topProjects`
    pub top_projects: usize,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: 2.0,
            trend_dead_band_pct: 5.0,
            top_projects: 5,
        }
    }
}

impl Config {
    /// Load from a YAML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env();
        config.validate()?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load when the file is optional: a missing file yields defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        debug!(path = %path.display(), "No configuration file, using defaults");
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without touching the environment
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::config(format!("invalid YAML: {e}")))
    }

    /// Overlay process environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay variables from an arbitrary lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(host) = lookup("BEACON_HOST") {
            self.server.host = host;
        }
        if let Some(kind) = lookup("BEACON_SINK_KIND").and_then(|k| k.parse().ok()) {
            self.sink.kind = kind;
        }
        if let Some(url) = lookup("BEACON_SINK_URL") {
            self.sink.write_url = Some(url);
        }
        if let Some(token) = lookup("BEACON_SINK_API_TOKEN") {
            self.sink.api_token = Some(token);
        }
        if let Some(endpoint) = lookup("BEACON_QUERY_ENDPOINT") {
            self.query.endpoint = endpoint;
        }
        if let Some(account) = lookup("BEACON_QUERY_ACCOUNT_ID") {
            self.query.account_id = Some(account);
        }
        if let Some(token) = lookup("BEACON_QUERY_API_TOKEN") {
            self.query.api_token = Some(token);
        }
        if let Some(file) = lookup("BEACON_QUERY_API_TOKEN_FILE") {
            self.query.api_token_file = Some(PathBuf::from(file));
        }
        if let Some(table) = lookup("BEACON_QUERY_TABLE") {
            self.query.table_override = Some(table);
        }
        if let Some(flag) = lookup("BEACON_SELF_OBSERVATION") {
            self.self_observation.enabled = flag == "true" || flag == "1";
        }
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("server.port must be non-zero"));
        }
        if self.sink.kind == SinkKind::Http && self.sink.write_url.is_none() {
            return Err(Error::config("sink.write_url is required for the http sink"));
        }
        if self.query.max_row_limit == 0 {
            return Err(Error::config("query.max_row_limit must be positive"));
        }
        if self.query.max_window_hours == 0 {
            return Err(Error::config("query.max_window_hours must be positive"));
        }
        if self.insights.zscore_threshold.is_nan() || self.insights.zscore_threshold <= 0.0 {
            return Err(Error::config("insights.zscore_threshold must be positive"));
        }
        if self.insights.trend_dead_band_pct < 0.0 {
            return Err(Error::config("insights.trend_dead_band_pct must not be negative"));
        }
        Ok(())
    }
}
