//! Retry with exponential backoff

use crate::{OutpostError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Quick retries for API calls.
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Slow retries for downloads and imports.
    pub fn slow() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Which errors a retry loop should swallow.
#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    All,
    /// Only transient errors (network, rate limit).
    Transient,
    Never,
}

/// Execute an async operation with retry logic.
pub async fn retry_with_backoff<F, Fut, T>(
    config: RetryConfig,
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(err) => {
                if !should_retry(&err, policy) {
                    debug!("{} failed with non-retryable error: {}", operation_name, err);
                    return Err(err);
                }

                if attempt >= config.max_attempts {
                    error!(
                        "{} failed after {} attempts: {}",
                        operation_name, config.max_attempts, err
                    );
                    return Err(OutpostError::RetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: config.max_attempts,
                        last_error: Box::new(err),
                    });
                }

                warn!(
                    "{} failed on attempt {}/{}: {}. Retrying in {:?}",
                    operation_name, attempt, config.max_attempts, err, delay
                );

                // A rate limiter may tell us exactly how long to wait.
                let wait = match &err {
                    OutpostError::RateLimited {
                        retry_after_secs: Some(secs),
                        ..
                    } => Duration::from_secs(*secs).max(delay),
                    _ => delay,
                };
                sleep(wait).await;

                delay = next_delay(delay, &config);
            }
        }
    }
}

fn should_retry(error: &OutpostError, policy: RetryPolicy) -> bool {
    match policy {
        RetryPolicy::Never => false,
        RetryPolicy::All => true,
        RetryPolicy::Transient => error.is_transient(),
    }
}

fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let mut next = current.mul_f64(config.backoff_multiplier);
    if next > config.max_delay {
        next = config.max_delay;
    }
    if config.jitter {
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        next = next.mul_f64(jitter).min(config.max_delay);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        let result = retry_with_backoff(config, RetryPolicy::Transient, "test_op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(OutpostError::network("indexer", "connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(
            RetryConfig::quick(),
            RetryPolicy::Transient,
            "test_op",
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(OutpostError::AuthFailed {
                        service: "indexer".to_string(),
                        message: "bad api key".to_string(),
                    })
                }
            },
        )
        .await;

        assert!(matches!(result, Err(OutpostError::AuthFailed { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_wrap_the_last_error() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            jitter: false,
        };

        let result: Result<()> =
            retry_with_backoff(config, RetryPolicy::Transient, "test_op", || async {
                Err(OutpostError::network("client", "timeout"))
            })
            .await;

        match result {
            Err(OutpostError::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }
}
