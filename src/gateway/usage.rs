//! Usage tracking via the UsageSink trait.
//!
//! The gateway logs all calls through a UsageSink. This decouples the gateway
//! from any specific destination:
//! - the CLI uses StderrUsageSink or NoopUsageSink
//! - tests use NoopUsageSink or a capturing sink

use async_trait::async_trait;

/// Status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of a provider API call for logging.
#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    /// Endpoint kind: "chat/completions" or "embeddings".
    pub endpoint: &'static str,
    /// Model id used.
    pub model: String,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Which code path made this call.
    pub caller: &'static str,
}

impl ProviderCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(endpoint: &'static str, model: impl Into<String>, caller: &'static str) -> Self {
        Self {
            endpoint,
            model: model.into(),
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            caller,
        }
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

/// Trait for recording provider call usage.
///
/// Recording is fire-and-forget: failures should be logged but not propagated.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: ProviderCallRecord);
}

/// No-op usage sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {
        // Discard
    }
}

/// Usage sink that writes to stderr as JSON lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        eprintln!(
            r#"{{"endpoint":"{}","model":"{}","latency_ms":{},"status":"{}","caller":"{}"}}"#,
            record.endpoint,
            record.model,
            record.latency_ms,
            record.status.as_str(),
            record.caller,
        );
    }
}
