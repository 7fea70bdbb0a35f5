//! Shared exponential-backoff-with-jitter calculation.
//!
//! Used by both the task queue's requeue path (spec §4.1) and the error
//! handler's retry policy (spec §4.3) so the two never drift on the
//! formula: `base * multiplier^attempt * (1 ± jitter)`, capped at `max`.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay for the given attempt (1-indexed: the first
    /// retry is `attempt == 1`), with jitter applied deterministically
    /// using the supplied `rng` so callers can test without flakiness.
    pub fn delay_with_rng(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let raw = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = raw.min(self.max.as_secs_f64());
        let jitter = rng.random_range(-self.jitter_factor..=self.jitter_factor);
        let jittered = (capped * (1.0 + jitter)).max(0.0);
        Duration::from_secs_f64(jittered.min(self.max.as_secs_f64()))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt_and_respects_ceiling() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter_factor: 0.0,
        };
        let mut rng = rand::rng();
        let d0 = policy.delay_with_rng(0, &mut rng);
        let d1 = policy.delay_with_rng(1, &mut rng);
        let d5 = policy.delay_with_rng(5, &mut rng);
        assert!(d0 < d1);
        assert!(d5 <= Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 1.0,
            jitter_factor: 0.5,
        };
        let mut rng = rand::rng();
        for _ in 0..100 {
            let d = policy.delay_with_rng(0, &mut rng);
            assert!(d >= Duration::from_millis(50));
            assert!(d <= Duration::from_millis(150));
        }
    }
}
