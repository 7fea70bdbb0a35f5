//! Per-operation circuit breaker (spec §4.3 part 2).
//!
//! State is process-local (spec §5: "Circuit breaker state is per-process;
//! not synchronized across replicas"). Grounded on the same closed-state-
//! machine shape the source repo uses for `SchedulerState` gating, applied
//! here to call protection instead of barrier admission.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    /// Whether the single half-open probe slot is currently claimed by an
    /// in-flight call; cleared once that call records success or failure.
    half_open_probe_in_flight: bool,
}

/// Opens when `failures >= failure_threshold` inside `monitoring_window`.
/// While `Open`, calls short-circuit until `reset_timeout` elapses, then
/// one probe is admitted (`HalfOpen`); three consecutive successes close
/// it again.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

const HALF_OPEN_SUCCESSES_TO_CLOSE: u32 = 3;

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                half_open_successes: 0,
                half_open_probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.reconcile_timeout(&mut inner);
        inner.state
    }

    fn reconcile_timeout(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.reset_timeout
        {
            inner.state = CircuitState::HalfOpen;
            inner.half_open_successes = 0;
            inner.half_open_probe_in_flight = false;
        }
    }

    /// Returns `Some(remaining)` if the call should be rejected, `None` if
    /// it may proceed (closed, or it claims the half-open probe slot).
    /// Only one caller claims that slot at a time; everyone else is
    /// rejected until the probe's outcome is recorded.
    pub fn check(&self) -> Option<Duration> {
        let mut inner = self.inner.lock();
        self.reconcile_timeout(&mut inner);
        match inner.state {
            CircuitState::Closed => None,
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Some(self.config.reset_timeout)
                } else {
                    inner.half_open_probe_in_flight = true;
                    None
                }
            }
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                Some(self.config.reset_timeout.saturating_sub(elapsed))
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures.clear();
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                inner.half_open_probe_in_flight = false;
                if inner.half_open_successes >= HALF_OPEN_SUCCESSES_TO_CLOSE {
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.failures.clear();
                inner.half_open_probe_in_flight = false;
            }
            CircuitState::Closed => {
                inner.failures.push_back(now);
                let window = self.config.monitoring_window;
                while inner
                    .failures
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > window)
                {
                    inner.failures.pop_front();
                }
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            timeout_threshold: Duration::from_secs(5),
            reset_timeout: Duration::from_millis(50),
            monitoring_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.check().is_some());
    }

    #[test]
    fn half_open_closes_after_three_successes() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
