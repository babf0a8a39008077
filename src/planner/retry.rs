//! Bounded retry around planner transport calls.
//!
//! Only the request/response exchange with the remote planner is retried here.
//! Function failures never pass through this layer.

use std::future::Future;
use std::time::{Duration, Instant};

use super::error::{PlannerError, RetryConfig};

/// A planner call that could not be completed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("planner call failed after {attempts} attempt(s): {last_error}")]
pub struct TransportError {
    /// Number of calls made, including the first one
    pub attempts: u32,
    /// Error returned by the final call
    pub last_error: PlannerError,
}

/// Run `operation` until it succeeds, a non-retryable error occurs, or the
/// retry budget in `config` is spent.
///
/// Each attempt is bounded by `timeout`; an attempt that overruns counts as a
/// transient [`PlannerError::timeout`].
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    timeout: Duration,
    operation_name: &str,
    mut operation: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlannerError>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        let error = match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 0 {
                    tracing::info!(
                        "{} succeeded after {} retries (total time: {:?})",
                        operation_name,
                        attempt,
                        start.elapsed()
                    );
                }
                return Ok(value);
            }
            Ok(Err(error)) => error,
            Err(_) => PlannerError::timeout(timeout),
        };

        let retryable = config.should_retry(&error) && attempt < config.max_retries;
        if !retryable {
            if attempt > 0 {
                tracing::error!(
                    "{} failed after {} retries (total time: {:?}): {}",
                    operation_name,
                    attempt,
                    start.elapsed(),
                    error
                );
            } else {
                tracing::error!("{} failed (non-retryable): {}", operation_name, error);
            }
            return Err(TransportError {
                attempts: attempt + 1,
                last_error: error,
            });
        }

        let remaining = config.max_retry_duration.saturating_sub(start.elapsed());
        let delay = error.suggested_delay(attempt, config).min(remaining);
        if remaining.is_zero() {
            tracing::warn!(
                "{} attempt {} failed, no retry time remaining: {}",
                operation_name,
                attempt + 1,
                error
            );
            return Err(TransportError {
                attempts: attempt + 1,
                last_error: error,
            });
        }

        tracing::warn!(
            "{} attempt {} failed with {}, retrying in {:?}: {}",
            operation_name,
            attempt + 1,
            error.kind,
            delay,
            error.message
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannerErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry(&fast_config(3), Duration::from_secs(1), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PlannerError::network_error("connection reset".to_string()))
                } else {
                    Ok("decision")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "decision");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> =
            with_retry(&fast_config(2), Duration::from_secs(1), "test", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PlannerError::server_error(502, "bad gateway".to_string()))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error.kind, PlannerErrorKind::ServerError);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> =
            with_retry(&fast_config(5), Duration::from_secs(1), "test", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PlannerError::unauthorized(401, "bad key".to_string()))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry(&fast_config(1), Duration::from_millis(20), "test", || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok::<_, PlannerError>(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
