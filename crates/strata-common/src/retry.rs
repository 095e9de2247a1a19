//! Bounded exponential backoff for worker-local retries
//!
//! Workers retry `Io` and `Conflict` kinds only; anything else is
//! surfaced to the caller on the first occurrence.

use crate::error::{Error, Result};
use std::time::Duration;

/// Retry `op` up to `attempts` times, sleeping `base * 2^n` between tries.
/// Only retryable error kinds are retried.
pub async fn with_backoff<T, F, Fut>(attempts: u32, base: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = base;
    let mut last: Option<Error> = None;
    for attempt in 0..attempts.max(1) {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                tracing::debug!(attempt, error = %e, "retrying after backoff");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| Error::internal("retry budget exhausted")))
}
