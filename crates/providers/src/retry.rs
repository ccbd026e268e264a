//! Rate-limit retry: exponential backoff with jitter around any provider.
//!
//! When the wrapped provider reports a retryable error (by default a rate
//! limit), sleeps and tries again, growing the delay each time. Any other
//! error is returned immediately.

use async_trait::async_trait;
use memloop_config::RetryConfig;
use memloop_core::error::ProviderError;
use memloop_core::provider::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether an error is worth retrying.
pub type RetryPredicate = fn(&ProviderError) -> bool;

/// Backoff settings.
///
/// Before each retry the delay is multiplied by
/// `multiplier * (1 + jitter * r)` with `r` uniform in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    pub retryable: RetryPredicate,
}

fn rate_limit_only(err: &ProviderError) -> bool {
    err.is_rate_limit()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 20,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
            retryable: rate_limit_only,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            multiplier: config.multiplier,
            jitter: config.jitter,
            retryable: rate_limit_only,
        }
    }

    /// The delay to use after `current`.
    fn next_delay(&self, current: Duration) -> Duration {
        let jitter = if self.jitter { rand::random::<f64>() } else { 0.0 };
        current.mul_f64(self.multiplier * (1.0 + jitter))
    }
}

/// A provider that retries the wrapped provider on rate limits.
pub struct RetryingProvider {
    name: String,
    inner: Arc<dyn memloop_core::Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn memloop_core::Provider>, policy: RetryPolicy) -> Self {
        Self {
            name: format!("retrying({})", inner.name()),
            inner,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn with_retry<T, F, Fut>(&self, mut call: F) -> std::result::Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let mut delay = self.policy.initial_delay;
        let mut retries: u32 = 0;

        loop {
            match call().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(provider = %self.inner.name(), retries, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if (self.policy.retryable)(&e) => {
                    retries += 1;
                    if retries > self.policy.max_retries {
                        warn!(
                            provider = %self.inner.name(),
                            attempts = retries,
                            "Giving up after repeated rate limits"
                        );
                        return Err(ProviderError::RetriesExhausted {
                            attempts: retries,
                            max_retries: self.policy.max_retries,
                        });
                    }

                    delay = self.policy.next_delay(delay);
                    warn!(
                        provider = %self.inner.name(),
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl memloop_core::Provider for RetryingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        self.with_retry(|| self.inner.complete(request.clone())).await
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        self.with_retry(|| self.inner.stream(request.clone())).await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
