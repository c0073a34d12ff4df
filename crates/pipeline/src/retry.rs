//! Retry with exponential backoff for provider calls.
//!
//! The attempt number is handed to the operation so callers can change
//! what they send on later attempts (prompt simplification).

use std::future::Future;
use std::time::Duration;

use reel_core::types::SceneId;
use reel_providers::ProviderError;
use tokio_util::sync::CancellationToken;

/// Tunable parameters for the backoff loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and policy.
///
/// The result is clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// Run `op` until it succeeds, fails fatally, or attempts run out.
///
/// Attempts are numbered from 1. Cancellation during a backoff wait
/// returns the last error immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    scene_id: SceneId,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= max_attempts {
            tracing::error!(
                scene_id,
                attempt,
                category = ?err.category(),
                error = %err,
                "Provider call failed",
            );
            return Err(err);
        }

        tracing::warn!(
            scene_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Provider call failed, retrying",
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, policy);
    }
}
