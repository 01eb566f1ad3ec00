//! Retry logic with exponential backoff
//!
//! Used for opening upstream media connections: a connection that cannot be
//! established, or that upstream answers with a transient status, is retried a
//! bounded number of times before the fetch is recorded as failed. Once bytes
//! have been written nothing is retried here; the partial file is discarded and
//! the next access starts over.

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, resets, upstream overload) return `true`.
/// Permanent failures (missing media, disk errors) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::ReadTimeout(_) => true,
            // 408 Request Timeout, 429 Too Many Requests, and server-side errors
            FetchError::UpstreamStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            FetchError::Truncated { .. } => false,
            FetchError::Overrun { .. } => false,
            FetchError::Disk(_) => false,
            FetchError::Abandoned => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after `config.max_attempts`
/// retries (so at most `max_attempts + 1` calls).
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(jittered_delay).await;

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Grow `delay` by the backoff multiplier, capped at `max_delay`
///
/// A multiplier that yields a negative, NaN or overflowing duration falls back
/// to `max_delay`.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .map_or(config.max_delay, |d| d.min(config.max_delay))
}

/// Spread `delay` uniformly over `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fast_config(3), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fast_config(3), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Network("connection reset".into()))
                } else {
                    Ok(1)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fast_config(2), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::UpstreamStatus {
                    url: "https://cdn.example/a.mp3".into(),
                    status: 503,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3, "initial call + 2 retries");
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fast_config(5), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::UpstreamStatus {
                    url: "https://cdn.example/gone.mp3".into(),
                    status: 404,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fetch_error_classification() {
        let status = |status| FetchError::UpstreamStatus {
            url: String::new(),
            status,
        };

        assert!(status(500).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(FetchError::ReadTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!FetchError::Abandoned.is_retryable());
        assert!(
            !FetchError::Disk(std::io::Error::new(std::io::ErrorKind::StorageFull, "full"))
                .is_retryable()
        );
    }

    #[test]
    fn delay_growth_is_capped() {
        let config = fast_config(3);
        assert_eq!(
            next_delay(Duration::from_millis(5), &config),
            Duration::from_millis(10)
        );
        assert_eq!(
            next_delay(Duration::from_millis(15), &config),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn unusable_multiplier_falls_back_to_max_delay() {
        for multiplier in [-1.0, f64::NAN, f64::INFINITY, 1e300] {
            let config = RetryConfig {
                backoff_multiplier: multiplier,
                ..fast_config(3)
            };
            assert_eq!(
                next_delay(Duration::from_millis(5), &config),
                config.max_delay,
                "{multiplier}"
            );
        }
    }

    #[tokio::test]
    async fn negative_multiplier_still_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let config = RetryConfig {
            backoff_multiplier: -1.0,
            ..fast_config(2)
        };

        let result = with_retry(&config, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Network("connection reset".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Network(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn jitter_stays_within_double_delay() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let d = add_jitter(base);
            assert!(d >= base && d <= base * 2);
        }
    }
}
