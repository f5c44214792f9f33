//! Exponential-backoff retry combinator.
//!
//! Not device-aware: callers wrap whatever operation they want retried,
//! typically a connect.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Calls `attempt` until it succeeds or `retries` further tries are
/// exhausted, sleeping between tries and doubling the delay each time. The
/// last error propagates unchanged.
///
/// `retries == 0` means a single attempt with no retry.
pub async fn with_backoff<T, E, F, Fut>(
    retries: u32,
    initial_delay: Duration,
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut remaining = retries;
    let mut delay = initial_delay;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if remaining == 0 => return Err(err),
            Err(_) => {
                warn!(
                    remaining,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                remaining -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ()> = with_backoff(3, Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_between_attempts() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = with_backoff(3, Duration::from_millis(100), || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err("nope") }
        })
        .await;
        assert_eq!(result, Err("nope"));
        assert_eq!(calls.load(Ordering::Relaxed), 4, "initial try plus 3 retries");
        // 100 + 200 + 400 ms of backoff in total.
        assert_eq!(start.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_backoff(5, Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::Relaxed);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = with_backoff(0, Duration::from_secs(10), || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err("final") }
        })
        .await;
        assert_eq!(result, Err("final"));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
