//! Navigation retries and human-like pacing.
//!
//! Maps occasionally drops a navigation mid-flight (net::ERR_ABORTED and
//! friends); those are retried with exponential backoff. Timeouts and
//! session failures are never retried here: a timeout is handled by the
//! caller, and a dead session will not come back.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ScraperError;

/// Retries `navigate` while it fails with [`ScraperError::Navigation`].
///
/// Makes at most `1 + max_retries` attempts. Before retry `n` (0-based) it
/// sleeps `backoff_base_ms << n` milliseconds. Any other error, and the last
/// navigation error once retries run out, is returned as is.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut navigate: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut retry = 0u32;
    loop {
        let err = match navigate().await {
            Ok(value) => return Ok(value),
            Err(err @ ScraperError::Navigation { .. }) if retry < max_retries => err,
            Err(err) => return Err(err),
        };

        let delay_ms = backoff_base_ms.saturating_mul(1u64 << retry.min(62));
        tracing::warn!(
            retry = retry + 1,
            max_retries,
            delay_ms,
            error = %err,
            "navigation dropped, retrying"
        );
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        retry += 1;
    }
}

/// Picks a uniformly random pause in `[min_ms, max_ms]`.
///
/// A zero upper bound disables pacing.
pub(crate) fn jittered_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let lo = min_ms.min(max_ms);
    let hi = min_ms.max(max_ms);
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}
