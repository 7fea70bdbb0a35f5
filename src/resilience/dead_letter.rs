//! Dead-letter queue (spec §4.3 part 3, glossary): bounded ring of
//! exhausted tasks, oldest-drops-on-overflow, purge by `retention_time`,
//! operator resubmit resets `retry_count`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::DeadLetterQueueConfig;
use crate::model::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub task: Task,
    pub error: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

pub struct DeadLetterQueue {
    config: DeadLetterQueueConfig,
    entries: Mutex<VecDeque<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new(config: DeadLetterQueueConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Push a failed task. Drops the oldest entry once `max_size` is
    /// exceeded rather than rejecting the new one — the DLQ is a diagnostic
    /// aid, not a durability guarantee (spec §4.3, §5).
    pub fn push(&self, task: Task, error: impl Into<String>) {
        if !self.config.enabled {
            return;
        }
        let mut entries = self.entries.lock();
        let attempts = task.retry_count;
        entries.push_back(DeadLetterEntry {
            task,
            error: error.into(),
            attempts,
            timestamp: Utc::now(),
        });
        while entries.len() > self.config.max_size {
            entries.pop_front();
        }
    }

    /// Purge entries older than `retention_time`. Returns how many were
    /// removed, for the `cleanupCompleted` channel.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|e| {
            now.signed_duration_since(e.timestamp)
                .to_std()
                .is_ok_and(|age| age <= self.config.retention_time)
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Remove and return the entry for `task_id`, resetting `retry_count`
    /// to zero so the caller can re-enqueue it (spec §4.3 — "resubmit ...
    /// resets retryCount").
    pub fn resubmit(&self, task_id: &str) -> Option<Task> {
        let mut entries = self.entries.lock();
        let idx = entries.iter().position(|e| e.task.id == task_id)?;
        let mut entry = entries.remove(idx)?;
        entry.task.retry_count = 0;
        entry.task.not_before = None;
        Some(entry.task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;
    use serde_json::json;
    use std::time::Duration;

    fn task(id: &str) -> Task {
        Task::new(id, TaskType::Parse, json!({}), 5)
    }

    #[test]
    fn overflow_drops_oldest() {
        let dlq = DeadLetterQueue::new(DeadLetterQueueConfig {
            enabled: true,
            max_size: 2,
            retention_time: Duration::from_secs(3600),
        });
        dlq.push(task("a"), "err");
        dlq.push(task("b"), "err");
        dlq.push(task("c"), "err");
        let ids: Vec<_> = dlq.snapshot().iter().map(|e| e.task.id.clone()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn resubmit_resets_retry_count() {
        let dlq = DeadLetterQueue::new(DeadLetterQueueConfig::default());
        let mut t = task("a");
        t.retry_count = 5;
        dlq.push(t, "db down");
        let resubmitted = dlq.resubmit("a").unwrap();
        assert_eq!(resubmitted.retry_count, 0);
        assert!(dlq.is_empty());
    }

    #[test]
    fn resubmit_missing_is_none() {
        let dlq = DeadLetterQueue::new(DeadLetterQueueConfig::default());
        assert!(dlq.resubmit("nope").is_none());
    }
}
