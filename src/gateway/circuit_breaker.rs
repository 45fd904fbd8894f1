// =============================================================================
// Circuit breaker — CLOSED / OPEN / HALF_OPEN for venue call protection
// =============================================================================
//
// Generalizes the trip/reset idiom in `risk::breakers::RiskEngine` (a
// `killed` flag flipped by `kill()`, cleared by `reset_daily()`) into a
// reusable three-state breaker keyed by consecutive-failure count and a
// cooldown timer, the classic shape for protecting an outbound call rather
// than gating account-level trading.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call should be allowed through right now. Transitions
    /// OPEN -> HALF_OPEN once the cooldown elapses, allowing exactly one
    /// trial call.
    pub fn allow(&self) -> bool {
        let mut s = self.inner.lock();
        match s.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                if s.opened_at.map(|t| t.elapsed() >= self.cooldown).unwrap_or(false) {
                    s.state = BreakerState::HalfOpen;
                    info!("circuit breaker half-open, allowing trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut s = self.inner.lock();
        if s.state != BreakerState::Closed {
            info!("circuit breaker closed after successful trial call");
        }
        s.state = BreakerState::Closed;
        s.consecutive_failures = 0;
        s.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut s = self.inner.lock();
        s.consecutive_failures += 1;
        if s.state == BreakerState::HalfOpen || s.consecutive_failures >= self.failure_threshold {
            if s.state != BreakerState::Open {
                warn!(failures = s.consecutive_failures, "circuit breaker tripped open");
            }
            s.state = BreakerState::Open;
            s.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(cb.allow());
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn half_open_trial_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_trial_success_closes() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(cb.allow());
    }
}
