//! Circuit breaker (§4.3.4): closed → open → half-open per collector key.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    status: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooloff: Duration,
    half_open_successes_required: u32,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooloff_secs: u64, half_open_successes_required: u32) -> Self {
        Self {
            failure_threshold,
            cooloff: Duration::seconds(cooloff_secs as i64),
            half_open_successes_required,
            state: Mutex::new(BreakerState {
                status: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a fetch may proceed right now. Transitions open -> half-open
    /// once the cool-off has elapsed.
    pub async fn allow_request(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.status {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed_ok = state.opened_at.map(|t| Utc::now() - t >= self.cooloff).unwrap_or(false);
                if elapsed_ok {
                    state.status = CircuitState::HalfOpen;
                    state.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        match state.status {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.half_open_successes_required {
                    state.status = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    state.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        match state.status {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.failure_threshold {
                    state.status = CircuitState::Open;
                    state.opened_at = Some(Utc::now());
                }
            }
            CircuitState::HalfOpen => {
                state.status = CircuitState::Open;
                state.opened_at = Some(Utc::now());
                state.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stays_closed_at_n_minus_one_failures() {
        let breaker = CircuitBreaker::new(5, 60, 2);
        for _ in 0..4 {
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_at_n_failures() {
        let breaker = CircuitBreaker::new(5, 60, 2);
        for _ in 0..5 {
            breaker.on_failure().await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_fails_fast_before_cooloff() {
        let breaker = CircuitBreaker::new(1, 3600, 2);
        breaker.on_failure().await;
        assert!(!breaker.allow_request().await);
    }

    #[tokio::test]
    async fn test_half_open_to_closed_after_successes() {
        let breaker = CircuitBreaker::new(1, 0, 2);
        breaker.on_failure().await; // opens
        assert!(breaker.allow_request().await); // cooloff 0s elapses immediately -> half-open
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.on_success().await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.on_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, 0, 2);
        breaker.on_failure().await;
        breaker.allow_request().await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.on_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }
}
