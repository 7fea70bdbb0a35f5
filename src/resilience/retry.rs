//! Retry policy (spec §4.3 part 1): exponential backoff with jitter,
//! retryable iff the error classifies as such (spec §7) and `attempts <
//! max`. Shares [`BackoffPolicy`] with the queue's requeue path so the two
//! never drift on the formula.

use crate::config::RetryConfig;
use crate::error::ErrorKind;
use crate::utils::backoff::BackoffPolicy;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: BackoffPolicy,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let backoff = BackoffPolicy {
            base: config.base_delay,
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        };
        Self { config, backoff }
    }

    pub fn should_retry(&self, kind: ErrorKind, attempts: u32) -> bool {
        kind.retryable() && attempts < self.config.max_attempts
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        self.backoff.delay(attempt)
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_only_retryable_kinds_under_max() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            ..RetryConfig::default()
        });
        assert!(policy.should_retry(ErrorKind::Transient, 0));
        assert!(policy.should_retry(ErrorKind::Transient, 2));
        assert!(!policy.should_retry(ErrorKind::Transient, 3));
        assert!(!policy.should_retry(ErrorKind::Validation, 0));
    }
}
