//! Write service: validate, transform, then write with bounded retry.
//!
//! The service never panics and never surfaces sink exceptions directly. Each
//! call ends in a [`WriteReceipt`] or one of three [`WriteError`] kinds, which
//! the transport layer maps to a response. Retries are sequential within one
//! call and back off with `tokio::time::sleep`, so they only delay the
//! request that triggered them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::config::SinkConfig;
use beacon_core::Record;
use beacon_storage::Sink;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::adapters::{AdapterKind, FormatAdapter, TransformContext};

/// Backoff exponent ceiling; keeps `2^attempt` from overflowing
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the failed attempt `attempt` (0-based): `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

impl From<&SinkConfig> for RetryPolicy {
    fn from(config: &SinkConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }
}

/// Why a write did not land
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The adapter refused the payload; the sink was not touched
    #[error("Invalid data format")]
    InvalidFormat,

    /// No sink is bound. Not retried.
    #[error("Sink is not configured")]
    SinkNotConfigured,

    /// Every attempt failed; carries the last sink error message
    #[error("{last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl From<WriteError> for beacon_core::Error {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::InvalidFormat => beacon_core::Error::InvalidFormat,
            WriteError::SinkNotConfigured => beacon_core::Error::config("sink is not configured"),
            WriteError::Exhausted {
                attempts,
                last_error,
            } => beacon_core::Error::SinkWrite {
                attempts,
                message: last_error,
            },
        }
    }
}

/// Successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub adapter: AdapterKind,
    /// Attempts used, 1 when the first write succeeded
    pub attempts: u32,
}

/// `{success, error?}` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&WriteReceipt> for WriteAck {
    fn from(_: &WriteReceipt) -> Self {
        WriteAck {
            success: true,
            error: None,
        }
    }
}

/// Orchestrates adapter and sink for one payload at a time
#[derive(Clone)]
pub struct WriteService {
    sink: Option<Arc<dyn Sink>>,
    policy: RetryPolicy,
}

impl fmt::Debug for WriteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteService")
            .field("sink", &self.sink_name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl WriteService {
    pub fn new(sink: Option<Arc<dyn Sink>>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn sink_name(&self) -> Option<&'static str> {
        self.sink.as_ref().map(|sink| sink.name())
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Validate and transform `payload` with `adapter`, then write the record
    #[instrument(skip_all, fields(adapter = %adapter.kind(), scope = ?ctx.index()))]
    pub async fn write(
        &self,
        payload: &Value,
        adapter: &dyn FormatAdapter,
        ctx: &TransformContext,
    ) -> Result<WriteReceipt, WriteError> {
        if !adapter.validate(payload) {
            debug!("Payload rejected by adapter");
            return Err(WriteError::InvalidFormat);
        }
        let record = adapter
            .transform(payload, ctx)
            .map_err(|_| WriteError::InvalidFormat)?;

        let attempts = self.write_record(&record).await?;
        Ok(WriteReceipt {
            adapter: adapter.kind(),
            attempts,
        })
    }

    /// Write an already-built record, retrying per the policy. Returns the
    /// number of attempts used.
    pub async fn write_record(&self, record: &Record) -> Result<u32, WriteError> {
        let sink = self.sink.as_ref().ok_or(WriteError::SinkNotConfigured)?;
        let total = self.policy.total_attempts();
        let mut last_error = String::new();

        for attempt in 0..total {
            match sink.write(record).await {
                Ok(()) => {
                    debug!(sink = sink.name(), attempt = attempt + 1, "Record written");
                    return Ok(attempt + 1);
                }
                Err(e) => {
                    warn!(
                        sink = sink.name(),
                        attempt = attempt + 1,
                        total,
                        error = %e,
                        "Sink write failed"
                    );
                    last_error = e.to_string();
                    if attempt + 1 < total {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        error!(
            sink = sink.name(),
            attempts = total,
            error = %last_error,
            "Sink write retries exhausted"
        );
        Err(WriteError::Exhausted {
            attempts: total,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LegacyAdapter;
    use async_trait::async_trait;
    use beacon_core::Error;
    use beacon_storage::MemorySink;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` writes, then succeeds
    #[derive(Debug)]
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Sink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn write(&self, _record: &Record) -> beacon_core::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(Error::connection(format!("attempt {} refused", call + 1)))
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    fn metric() -> Value {
        json!({ "session_id": "s1", "metric_name": "m", "value": 10 })
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.total_attempts(), 4);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        // huge attempt numbers saturate instead of overflowing
        assert!(policy.delay_for(u32::MAX) >= policy.delay_for(2));
    }

    #[tokio::test]
    async fn test_write_success() {
        let sink = Arc::new(MemorySink::new());
        let service = WriteService::new(Some(sink.clone() as Arc<dyn Sink>), fast_policy(3));

        let receipt = service
            .write(&metric(), &LegacyAdapter, &TransformContext::default())
            .await
            .unwrap();
        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.adapter, AdapterKind::Legacy);

        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].doubles(), &[10.0]);
    }

    #[tokio::test]
    async fn test_invalid_payload_never_touches_sink() {
        let sink = Arc::new(FlakySink::new(0));
        let service = WriteService::new(Some(sink.clone() as Arc<dyn Sink>), fast_policy(3));

        let result = service
            .write(&json!({ "nope": true }), &LegacyAdapter, &TransformContext::default())
            .await;
        assert_eq!(result, Err(WriteError::InvalidFormat));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_sink_is_not_retried() {
        let service = WriteService::new(None, fast_policy(3));
        let result = service
            .write(&metric(), &LegacyAdapter, &TransformContext::default())
            .await;
        assert_eq!(result, Err(WriteError::SinkNotConfigured));
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let sink = Arc::new(FlakySink::new(2));
        let service = WriteService::new(Some(sink.clone() as Arc<dyn Sink>), fast_policy(3));

        let receipt = service
            .write(&metric(), &LegacyAdapter, &TransformContext::default())
            .await
            .unwrap();
        assert_eq!(receipt.attempts, 3);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let sink = Arc::new(FlakySink::new(u32::MAX));
        let service = WriteService::new(Some(sink.clone() as Arc<dyn Sink>), fast_policy(2));

        let result = service
            .write(&metric(), &LegacyAdapter, &TransformContext::default())
            .await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        match &result {
            Err(WriteError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(*attempts, 3);
                assert!(last_error.contains("attempt 3 refused"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let core: Error = result.unwrap_err().into();
        assert_eq!(core.kind(), "sink_write_failure");
    }

    #[test]
    fn test_ack_serialization() {
        let receipt = WriteReceipt {
            adapter: AdapterKind::Legacy,
            attempts: 1,
        };
        assert_eq!(
            serde_json::to_value(WriteAck::from(&receipt)).unwrap(),
            json!({ "success": true })
        );
    }
}
