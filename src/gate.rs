//! Admission control for every outbound call to the risk API.
//!
//! Two independent bounds apply to each attempt:
//!
//! - **Concurrency**: a counting semaphore with `max_concurrent_requests`
//!   slots. A slot is held for the duration of one attempt and released
//!   before any backoff sleep.
//! - **Throughput**: a GCRA rate limiter allowing `rate_limit` attempts per
//!   second, with a burst of `rate_limit`. Once the burst is spent,
//!   admissions are paced one every `1 / rate_limit` seconds.
//!
//! Retries go back through both bounds, so every attempt costs a fresh
//! concurrency slot and a fresh throughput slot.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::Config;
use crate::errors::ScreenError;
use crate::retry::{retry, RetryPolicy};

pub struct RequestGate {
    concurrency: Arc<Semaphore>,
    throughput: DefaultDirectRateLimiter,
    policy: RetryPolicy,
}

impl RequestGate {
    pub fn new(
        rate_limit: u32,
        max_concurrent: usize,
        policy: RetryPolicy,
    ) -> Result<Self, ScreenError> {
        let rate = NonZeroU32::new(rate_limit)
            .ok_or_else(|| ScreenError::Config("rate limit must be at least 1".to_string()))?;
        if max_concurrent == 0 {
            return Err(ScreenError::Config(
                "max concurrent requests must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            concurrency: Arc::new(Semaphore::new(max_concurrent)),
            throughput: RateLimiter::direct(Quota::per_second(rate)),
            policy,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ScreenError> {
        Self::new(
            config.rate_limit,
            config.max_concurrent_requests,
            RetryPolicy::new(
                config.max_retries,
                config.retry_min_backoff,
                config.retry_max_backoff,
            ),
        )
    }

    /// Concurrency slots not currently held by an attempt.
    pub fn available_slots(&self) -> usize {
        self.concurrency.available_permits()
    }

    /// Waits for a concurrency slot, then for a throughput slot.
    ///
    /// The concurrency slot is taken first so tokens are only spent by
    /// attempts that start right away.
    pub async fn admit(&self) -> Result<SemaphorePermit<'_>, ScreenError> {
        let permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| ScreenError::Cancelled)?;
        self.throughput.until_ready().await;
        Ok(permit)
    }

    /// Runs `operation` under the gate, retrying transient failures with
    /// exponential backoff. Each attempt is admitted separately.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ScreenError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScreenError>>,
    {
        let policy = self.policy;
        retry(
            |_attempt| {
                let call = operation();
                async move {
                    let _permit = self.admit().await?;
                    call.await
                }
            },
            policy.max_attempts,
            |attempt| policy.backoff(attempt),
            ScreenError::is_retryable,
        )
        .await
    }
}
