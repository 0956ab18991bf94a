//! Uniform-interval retry for push cycles.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Run `op` until it succeeds, sleeping `interval` between attempts.
///
/// # Arguments
/// * `max_attempts` - Give up after this many attempts; `None` never gives up
/// * `interval` - Fixed delay between attempts
/// * `label` - Names the operation in logs
///
/// # Returns
/// The first success, or the last error once attempts are exhausted
pub async fn retry_with_uniform_interval<T, E, F, Fut>(
    max_attempts: Option<u32>,
    interval: Duration,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    log::error!(
                        target: "configsync::retry",
                        "{} failed after {} attempts: {}",
                        label,
                        attempt,
                        e
                    );
                    return Err(e);
                }
                log::warn!(
                    target: "configsync::retry",
                    "{} failed (attempt {}), retrying in {:?}: {}",
                    label,
                    attempt,
                    interval,
                    e
                );
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Result<u32, String> =
            retry_with_uniform_interval(None, Duration::from_millis(500), "flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 4 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(4));
        // Three failures, three uniform sleeps
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> =
            retry_with_uniform_interval(Some(3), Duration::from_millis(10), "down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("unreachable")
            })
            .await;

        assert_eq!(result, Err("unreachable"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_success_does_not_sleep() {
        let result: Result<&str, &str> =
            retry_with_uniform_interval(None, Duration::from_secs(3600), "ok", || async { Ok("done") })
                .await;
        assert_eq!(result, Ok("done"));
    }
}
