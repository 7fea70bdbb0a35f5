//! The fixed, typed event channel set from spec §9.
//!
//! The source repo's event-emitter-style fan-out becomes, per the spec,
//! "a typed publish interface with a fixed set of channels ... each
//! carries a plain record; no inheritance." [`Event`] is that interface:
//! one variant per channel, each holding a plain `..Payload` struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

macro_rules! payload {
    ($name:ident { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        pub struct $name {
            pub at: DateTime<Utc>,
            $(pub $field: $ty,)*
        }
    };
}

payload!(JobEnqueuedPayload { job_id: String, session_id: String });
payload!(JobStartedPayload { job_id: String, attempt: u32 });
payload!(JobCompletedPayload { job_id: String, checkpoint_id: String });
payload!(JobFailedPayload { job_id: String, error: String });
payload!(JobAttemptFailedPayload { job_id: String, attempt: u32, error: String });
payload!(JobDeadLetteredPayload { job_id: String, attempts: u32, last_error: String });
payload!(BatchCreatedPayload { batch_id: String, item_count: usize });
payload!(BatchCompletedPayload { batch_id: String, processed: usize, failed: usize });
payload!(RollbackCreatedPayload { rollback_point_id: String, name: String });
payload!(RollbackStartedPayload { operation_id: String, rollback_point_id: String });
payload!(RollbackProgressPayload { operation_id: String, progress: u8 });
payload!(RollbackCompletedPayload { operation_id: String, applied: usize });
payload!(RollbackFailedPayload { operation_id: String, error: String });
payload!(MetricsUpdatedPayload { source: String, metrics: Value });
payload!(CleanupCompletedPayload { source: String, removed: usize });
payload!(QueueOverflowPayload { partition: String, depth: usize });

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "channel")]
pub enum Event {
    JobEnqueued(JobEnqueuedPayload),
    JobStarted(JobStartedPayload),
    JobCompleted(JobCompletedPayload),
    JobFailed(JobFailedPayload),
    JobAttemptFailed(JobAttemptFailedPayload),
    JobDeadLettered(JobDeadLetteredPayload),
    BatchCreated(BatchCreatedPayload),
    BatchCompleted(BatchCompletedPayload),
    RollbackCreated(RollbackCreatedPayload),
    RollbackStarted(RollbackStartedPayload),
    RollbackProgress(RollbackProgressPayload),
    RollbackCompleted(RollbackCompletedPayload),
    RollbackFailed(RollbackFailedPayload),
    MetricsUpdated(MetricsUpdatedPayload),
    CleanupCompleted(CleanupCompletedPayload),
    QueueOverflow(QueueOverflowPayload),
}

impl Event {
    pub fn channel_label(&self) -> &'static str {
        match self {
            Event::JobEnqueued(_) => "jobEnqueued",
            Event::JobStarted(_) => "jobStarted",
            Event::JobCompleted(_) => "jobCompleted",
            Event::JobFailed(_) => "jobFailed",
            Event::JobAttemptFailed(_) => "jobAttemptFailed",
            Event::JobDeadLettered(_) => "jobDeadLettered",
            Event::BatchCreated(_) => "batchCreated",
            Event::BatchCompleted(_) => "batchCompleted",
            Event::RollbackCreated(_) => "rollbackCreated",
            Event::RollbackStarted(_) => "rollbackStarted",
            Event::RollbackProgress(_) => "rollbackProgress",
            Event::RollbackCompleted(_) => "rollbackCompleted",
            Event::RollbackFailed(_) => "rollbackFailed",
            Event::MetricsUpdated(_) => "metricsUpdated",
            Event::CleanupCompleted(_) => "cleanupCompleted",
            Event::QueueOverflow(_) => "queueOverflow",
        }
    }

    pub fn queue_overflow(partition: impl Into<String>, depth: usize) -> Self {
        Event::QueueOverflow(QueueOverflowPayload {
            at: Utc::now(),
            partition: partition.into(),
            depth,
        })
    }

    pub fn metrics_updated(source: impl Into<String>, metrics: Value) -> Self {
        Event::MetricsUpdated(MetricsUpdatedPayload {
            at: Utc::now(),
            source: source.into(),
            metrics,
        })
    }
}

impl Event {
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "<unserializable>".to_string());
        write!(f, "[{}] {}", self.channel_label(), json)
    }
}
