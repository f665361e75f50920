//! Exponential backoff with jitter for outbound provider calls.
//!
//! [`with_backoff`] takes the operation as a closure and re-invokes it while it fails with a
//! transient error and attempts remain. [`RetryingClient`] applies the same policy to every call
//! made through a [`CompletionClient`], so call sites never carry their own retry loops.
//!
//! Attempt `n` (1-based) that fails transiently is followed by a sleep drawn uniformly from
//! `[base_delay, min(max_delay, base_delay * 2^n)]`.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::metrics::SummaryMetrics;

/// Errors that can report whether another attempt may succeed.
pub trait Retryable {
    /// True for failures expected to clear up on retry.
    fn is_transient(&self) -> bool;
}

impl Retryable for CompletionError {
    fn is_transient(&self) -> bool {
        CompletionError::is_transient(self)
    }
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below one are treated as one.
    pub max_attempts: u32,
    /// Lower bound of every wait and the unit of the exponential growth.
    pub base_delay: Duration,
    /// Cap applied to the upper bound of every wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Range the wait after failed attempt `attempt` (1-based) is drawn from.
    pub fn backoff_range(&self, attempt: u32) -> (Duration, Duration) {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let upper = self
            .base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
            .max(self.base_delay);
        (self.base_delay, upper)
    }

    /// Draw a jittered wait for failed attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let (lower, upper) = self.backoff_range(attempt);
        let lower_ms = lower.as_millis() as u64;
        let upper_ms = upper.as_millis() as u64;
        if upper_ms <= lower_ms {
            return lower;
        }
        Duration::from_millis(rand::rng().random_range(lower_ms..=upper_ms))
    }
}

/// Run `operation` until it succeeds, fails fatally, or exhausts `policy.max_attempts`.
///
/// Each retry is logged at `warn` before sleeping. The last error is returned unchanged.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_transient() => {
                tracing::debug!(
                    operation = label,
                    attempt,
                    error = %error,
                    "Non-retryable failure"
                );
                return Err(error);
            }
            Err(error) if attempt >= max_attempts => {
                tracing::error!(
                    operation = label,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(error);
            }
            Err(error) => {
                let wait = policy.backoff(attempt);
                tracing::warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %error,
                    "Transient failure; retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// [`CompletionClient`] decorator that routes every call through [`with_backoff`].
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
    metrics: Option<Arc<SummaryMetrics>>,
}

impl<C> RetryingClient<C> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            metrics: None,
        }
    }

    /// Count attempts and retries into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<SummaryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<C> CompletionClient for RetryingClient<C>
where
    C: CompletionClient,
{
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut attempts = 0u64;
        let result = with_backoff(&self.policy, "chat_completion", || {
            attempts += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_completion_call();
            }
            self.inner.complete(request.clone())
        })
        .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_retries(attempts.saturating_sub(1));
        }
        result
    }
}
