//! Completion gateway for the VNPT model tiers.

pub mod error;
pub mod types;
pub mod usage;
pub mod vnpt;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use usage::{CallStatus, ProviderCallRecord, UsageSink as UsageSinkTrait};
use vnpt::{ChatProvider, VnptAdapter};

pub use error::{ErrorContext, ProviderError};
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Retries after the first attempt (6 attempts total by default).
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base_delay: Duration::from_secs(2),
        }
    }
}

/// Gateway that wraps a provider with bounded retry and usage recording.
pub struct RetryingGateway<P: ChatProvider, U: UsageSinkTrait> {
    provider: P,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<P: ChatProvider, U: UsageSinkTrait> CompletionGateway for RetryingGateway<P, U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        RetryingGateway::chat(self, req).await
    }
}

impl<U: UsageSinkTrait> RetryingGateway<VnptAdapter, U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let provider = VnptAdapter::from_env()?;
        Ok(Self {
            provider,
            usage_sink,
            config: GatewayConfig::default(),
        })
    }
}

impl<P: ChatProvider, U: UsageSinkTrait> RetryingGateway<P, U> {
    pub fn with_config(provider: P, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        Self {
            provider,
            usage_sink,
            config,
        }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        for attempt in 0..=self.config.max_retries {
            let result = self.provider.chat(&req).await;
            match result {
                Ok(resp) => {
                    self.record_usage(&req, &resp, CallStatus::Success, None)
                        .await;
                    return Ok(resp);
                }
                Err(err) => {
                    let code = err.code().to_string();
                    self.record_usage(&req, &ChatResponse::empty(), CallStatus::Error, Some(code))
                        .await;

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::warn!(
                        caller = req.attribution.caller,
                        attempt,
                        ?delay,
                        error = %err,
                        "retrying completion call"
                    );
                    sleep(delay).await;
                }
            }
        }

        // The loop always returns from its last iteration.
        Err(ProviderError::provider("vnpt", "unknown error", false))
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
        status: CallStatus,
        error_code: Option<String>,
    ) {
        let record = ProviderCallRecord::new(
            "chat/completions",
            req.tier.model_id(),
            req.attribution.caller,
        )
        .latency(resp.latency.as_millis() as u64);

        let record = if status == CallStatus::Error {
            record.error(error_code.unwrap_or_else(|| "provider_error".to_string()))
        } else {
            record
        };

        self.usage_sink.record(record).await;
    }
}

/// Linear backoff: base, 2*base, 3*base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (attempt + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(10));
    }
}
