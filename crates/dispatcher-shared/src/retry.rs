//! Bounded-attempt retry with exponential backoff plus jitter. Used by
//! every store operation; expressed as a free function parameterised
//! over the operation rather than a trait, since Rust's async closures
//! make the "higher-order operation" shape straightforward without an
//! `interface Retryable<T>` indirection.

use std::future::Future;
use std::time::Duration;

/// Runs `op` up to `retries` times. On success returns `Some(value)`
/// immediately. On every failure, logs the attempt and sleeps
/// `base_delay * 2^(attempt-1) + uniform(0, 0.3s)` before the next try
/// (including after the final attempt, matching the source algorithm
/// literally). After all attempts are exhausted, invokes `fallback` if
/// supplied, otherwise returns `None` ("absent") — the caller decides
/// whether that's acceptable.
pub async fn retry<T, E, F, Fut>(
    mut op: F,
    name: &str,
    retries: u32,
    base_delay: Duration,
    fallback: Option<Box<dyn FnOnce() -> T + Send>>,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    for attempt in 1..=retries {
        match op().await {
            Ok(value) => return Some(value),
            Err(error) => {
                let delay = backoff_delay(base_delay, attempt);
                tracing::warn!(
                    op = name,
                    attempt,
                    retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "store operation failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    match fallback {
        Some(produce) => Some(produce()),
        None => {
            tracing::error!(op = name, retries, "retry attempts exhausted; returning absent");
            None
        }
    }
}

fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let exponential = base_delay.mul_f64(2f64.powi((attempt - 1) as i32));
    exponential + Duration::from_secs_f64(fastrand::f64() * 0.3)
}
