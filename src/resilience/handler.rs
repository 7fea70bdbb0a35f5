//! C3: the three cooperating parts of spec §4.3 wired behind one facade.
//!
//! `ErrorHandler` keeps one [`CircuitBreaker`] per named operation (a
//! `dashmap`-backed registry — grounded on the same concurrent-map
//! rationale as `examples/stratadb-labs-strata-core`), a single shared
//! [`RetryPolicy`], a [`DeadLetterQueue`] for tasks that exhaust retries,
//! and an [`ErrorReporter`] for sampled reporting.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::instrument;

use crate::config::ErrorHandlerConfig;
use crate::error::ErrorKind;
use crate::event_bus::{Event, EventEmitter};
use crate::model::Task;

use super::circuit_breaker::CircuitBreaker;
use super::dead_letter::{DeadLetterEntry, DeadLetterQueue};
use super::error::ErrorHandlerError;
use super::reporting::ErrorReporter;
use super::retry::RetryPolicy;

pub struct ErrorHandler {
    retry: RetryPolicy,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    breaker_config: crate::config::CircuitBreakerConfig,
    dead_letters: DeadLetterQueue,
    reporter: ErrorReporter,
    emitter: Arc<dyn EventEmitter>,
}

impl ErrorHandler {
    pub fn new(config: ErrorHandlerConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry),
            breakers: DashMap::new(),
            breaker_config: config.circuit_breaker,
            dead_letters: DeadLetterQueue::new(config.dead_letter_queue),
            reporter: ErrorReporter::new(config.error_reporting),
            emitter,
        }
    }

    fn breaker_for(&self, operation: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config.clone())))
            .clone()
    }

    /// Check whether `operation` may proceed; `Err` if its breaker is open.
    #[instrument(skip(self), err)]
    pub fn guard(&self, operation: &str) -> Result<(), ErrorHandlerError> {
        let breaker = self.breaker_for(operation);
        match breaker.check() {
            None => Ok(()),
            Some(remaining) => Err(ErrorHandlerError::CircuitOpen {
                operation: operation.to_string(),
                retry_after_ms: remaining.as_millis() as u64,
            }),
        }
    }

    pub fn record_success(&self, operation: &str) {
        self.breaker_for(operation).record_success();
    }

    pub fn record_failure(&self, operation: &str) {
        self.breaker_for(operation).record_failure();
    }

    pub fn should_retry(&self, kind: ErrorKind, attempts: u32) -> bool {
        self.retry.should_retry(kind, attempts)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.retry.delay_for_attempt(attempt)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts()
    }

    /// Route an exhausted task to the dead-letter queue and notify
    /// subscribers (spec §4.3, §7 — C1/C2 escalate here once retries run
    /// out).
    pub fn dead_letter(&self, task: Task, error: impl Into<String>) {
        let error = error.into();
        let attempts = task.retry_count;
        let task_id = task.id.clone();
        self.dead_letters.push(task, error.clone());
        let _ = self.emitter.emit(Event::JobDeadLettered(crate::event_bus::JobDeadLetteredPayload {
            at: chrono::Utc::now(),
            job_id: task_id,
            attempts,
            last_error: error,
        }));
    }

    pub fn dead_letter_entries(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.snapshot()
    }

    pub fn resubmit_from_dlq(&self, task_id: &str) -> Option<Task> {
        self.dead_letters.resubmit(task_id)
    }

    pub fn purge_dead_letters(&self) -> usize {
        self.dead_letters.purge_expired()
    }

    pub fn should_report(&self, now_unix_secs: u64) -> bool {
        self.reporter.should_report(now_unix_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, MemorySink};
    use crate::model::TaskType;
    use serde_json::json;

    fn handler() -> (ErrorHandler, Arc<EventBus>) {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let handler = ErrorHandler::new(ErrorHandlerConfig::default(), bus.get_emitter());
        (handler, bus)
    }

    #[test]
    fn circuit_opens_per_operation_independently() {
        let (handler, _bus) = handler();
        for _ in 0..5 {
            handler.record_failure("graph.query");
        }
        assert!(handler.guard("graph.query").is_err());
        assert!(handler.guard("graph.create_entities").is_ok());
    }

    #[test]
    fn dead_letter_then_resubmit_round_trips() {
        let (handler, _bus) = handler();
        let task = Task::new("t1", TaskType::Parse, json!({}), 5);
        handler.dead_letter(task, "db down");
        assert_eq!(handler.dead_letter_entries().len(), 1);
        let resubmitted = handler.resubmit_from_dlq("t1").unwrap();
        assert_eq!(resubmitted.retry_count, 0);
        assert!(handler.dead_letter_entries().is_empty());
    }
}
