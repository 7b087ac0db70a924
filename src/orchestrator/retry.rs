//! Retry with exponential backoff (§4.3.7).

use std::future::Future;
use std::time::Duration;

use crate::orchestrator::priority_queue::Priority;
use crate::types::CoreError;

/// Whether an error kind is worth retrying. Permanent source errors,
/// rate-limit/circuit states, and look-ahead violations propagate
/// immediately — only transient network-shaped failures are retried.
pub fn is_retryable(err: &CoreError) -> bool {
    matches!(err, CoreError::TransientSource { .. })
}

fn backoff_for(attempt: u32, base: Duration, priority: Priority) -> Duration {
    let multiplier = match priority {
        Priority::Critical => 0.5,
        Priority::High => 0.75,
        Priority::Normal | Priority::Low => 1.0,
    };
    let doubled = base.as_secs_f64() * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(doubled * multiplier)
}

/// Retry `op` up to `max_retries` times on retryable errors, with
/// exponential backoff scaled by request priority.
pub async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    base_backoff: Duration,
    priority: Priority,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempt < max_retries => {
                tokio::time::sleep(backoff_for(attempt, base_backoff, priority)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_permanent_errors_not_retryable() {
        assert!(!is_retryable(&CoreError::PermanentSource { source: "odds".into(), message: "404".into() }));
        assert!(!is_retryable(&CoreError::RateLimitExceeded("odds".into())));
        assert!(!is_retryable(&CoreError::CircuitOpen("odds".into())));
    }

    #[test]
    fn test_transient_errors_retryable() {
        assert!(is_retryable(&CoreError::TransientSource { source: "odds".into(), message: "timeout".into() }));
    }

    #[test]
    fn test_critical_priority_halves_delay() {
        let normal = backoff_for(1, Duration::from_secs(1), Priority::Normal);
        let critical = backoff_for(1, Duration::from_secs(1), Priority::Critical);
        assert!((critical.as_secs_f64() - normal.as_secs_f64() * 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_retries_up_to_max_then_propagates() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), CoreError> = retry_with_backoff(2, Duration::from_millis(1), Priority::Critical, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::TransientSource { source: "odds".into(), message: "503".into() })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn test_permanent_error_short_circuits_without_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), CoreError> = retry_with_backoff(3, Duration::from_millis(1), Priority::Normal, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::PermanentSource { source: "odds".into(), message: "400".into() })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
