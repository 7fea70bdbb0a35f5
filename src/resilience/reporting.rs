//! Error-reporting rate limiting (spec §4.3 — "Errors are also
//! rate-limited for reporting (`sampleRate`, `maxErrorsPerMinute`)").
//! Deliberately separate from retry/circuit-breaker decisions: an error
//! can be retried silently while still being sampled out of the report
//! stream, or vice versa.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use rand::Rng;

use crate::config::ErrorReportingConfig;

pub struct ErrorReporter {
    config: ErrorReportingConfig,
    window_start_secs: AtomicU64,
    count_in_window: AtomicU32,
}

impl ErrorReporter {
    pub fn new(config: ErrorReportingConfig) -> Self {
        Self {
            config,
            window_start_secs: AtomicU64::new(0),
            count_in_window: AtomicU32::new(0),
        }
    }

    /// Whether this error should be surfaced to reporting, given
    /// `sample_rate` and a one-minute sliding counter.
    pub fn should_report(&self, now_unix_secs: u64) -> bool {
        if !self.config.enabled {
            return false;
        }
        let window_start = self.window_start_secs.load(Ordering::Relaxed);
        if now_unix_secs.saturating_sub(window_start) >= 60 {
            self.window_start_secs.store(now_unix_secs, Ordering::Relaxed);
            self.count_in_window.store(0, Ordering::Relaxed);
        }
        if self.count_in_window.fetch_add(1, Ordering::Relaxed) >= self.config.max_errors_per_minute {
            return false;
        }
        if self.config.sample_rate >= 1.0 {
            return true;
        }
        rand::rng().random_bool(self.config.sample_rate.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_max_errors_per_minute() {
        let reporter = ErrorReporter::new(ErrorReportingConfig {
            enabled: true,
            sample_rate: 1.0,
            max_errors_per_minute: 3,
        });
        let reported: Vec<bool> = (0..5).map(|_| reporter.should_report(1_000)).collect();
        assert_eq!(reported, vec![true, true, true, false, false]);
    }

    #[test]
    fn disabled_never_reports() {
        let reporter = ErrorReporter::new(ErrorReportingConfig {
            enabled: false,
            ..ErrorReportingConfig::default()
        });
        assert!(!reporter.should_report(1_000));
    }
}
