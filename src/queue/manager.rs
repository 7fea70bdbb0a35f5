use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tracing::instrument;

use crate::config::QueueConfig;
use crate::config::PartitionStrategy;
use crate::event_bus::{EmitterError, Event, EventEmitter};
use crate::model::Task;
use crate::utils::backoff::BackoffPolicy;

use super::error::QueueError;
use super::metrics::{QueueCounters, QueueMetrics, snapshot};
use super::partition::Partition;

/// Partitioned, priority-ordered task queue with backpressure and
/// backoff-driven requeue (spec §4.1).
pub struct TaskQueueManager {
    partitions: Vec<Partition>,
    config: QueueConfig,
    counters: QueueCounters,
    backoff: BackoffPolicy,
    emitter: Arc<dyn EventEmitter>,
    round_robin_cursor: std::sync::atomic::AtomicUsize,
}

impl TaskQueueManager {
    pub fn new(config: QueueConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        let partitions = (0..config.partitions.max(1)).map(|_| Partition::new()).collect();
        Self {
            partitions,
            config,
            counters: QueueCounters::default(),
            backoff: BackoffPolicy::default(),
            emitter,
            round_robin_cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.counters
    }

    pub fn metrics(&self) -> QueueMetrics {
        snapshot(self)
    }

    fn partition_index(&self, task: &Task) -> usize {
        let n = self.partitions.len();
        match self.config.partition_strategy {
            PartitionStrategy::Priority => (task.priority as usize).min(n - 1),
            PartitionStrategy::Hash => {
                let key = task.partition_key.as_deref().unwrap_or(&task.id);
                let mut hasher = FxHasher::default();
                key.hash(&mut hasher);
                (hasher.finish() as usize) % n
            }
            PartitionStrategy::RoundRobin => self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % n,
        }
    }

    fn total_depth(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Enqueue a task, subject to backpressure (spec §4.1): once total
    /// depth exceeds `backpressure_threshold`, only `priority <= 2` tasks
    /// are still admitted.
    #[instrument(skip(self, task), fields(task_id = %task.id, priority = task.priority), err)]
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let depth = self.total_depth();
        if self.config.enable_backpressure && depth > self.config.backpressure_threshold && task.priority > 2 {
            let idx = self.partition_index(&task);
            let _ = self.emitter.emit(Event::queue_overflow(idx.to_string(), depth));
            return Err(QueueError::Overflow {
                partition: idx.to_string(),
                depth,
                threshold: self.config.backpressure_threshold,
            });
        }
        let idx = self.partition_index(&task);
        self.partitions[idx].push(task);
        Ok(())
    }

    pub fn dequeue(&self, partition: usize) -> Result<Option<Task>, QueueError> {
        let partition_ref = self.partitions.get(partition).ok_or(QueueError::UnknownPartition(partition))?;
        Ok(partition_ref.dequeue_ready(Utc::now()))
    }

    pub fn dequeue_batch(&self, partition: usize) -> Result<Vec<Task>, QueueError> {
        let partition_ref = self.partitions.get(partition).ok_or(QueueError::UnknownPartition(partition))?;
        Ok(partition_ref.dequeue_batch(Utc::now(), self.config.max_batch))
    }

    /// Requeue a task that failed with a retryable error: bump
    /// `retry_count`, push `not_before` out per the shared backoff
    /// formula, and reinsert into the same partition the task already
    /// resolves to. Returns `None` (instead of requeuing) once
    /// `max_retries` is exhausted — callers surface that to C3.
    pub fn requeue_with_backoff(&self, mut task: Task) -> Option<()> {
        self.counters.record_error();
        if task.exhausted() {
            return None;
        }
        task.retry_count += 1;
        let delay = self.backoff.delay(task.retry_count);
        task.not_before = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        let idx = self.partition_index(&task);
        self.partitions[idx].push(task);
        Some(())
    }

    pub fn emit_overflow_if_backpressured(&self) -> Result<(), EmitterError> {
        let depth = self.total_depth();
        if self.config.enable_backpressure && depth > self.config.backpressure_threshold {
            self.emitter.emit(Event::queue_overflow("*", depth))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::MemorySink;
    use crate::model::TaskType;
    use serde_json::json;

    fn manager(config: QueueConfig) -> (TaskQueueManager, Arc<crate::event_bus::EventBus>) {
        let bus = Arc::new(crate::event_bus::EventBus::with_sink(MemorySink::new()));
        let emitter = bus.get_emitter();
        (TaskQueueManager::new(config, emitter), bus)
    }

    #[test]
    fn round_robin_spreads_across_partitions() {
        let config = QueueConfig {
            partitions: 4,
            ..QueueConfig::default()
        };
        let (manager, _bus) = manager(config);
        for i in 0..8 {
            let task = Task::new(format!("t{i}"), TaskType::Parse, json!({}), 5);
            manager.enqueue(task).unwrap();
        }
        let depths: Vec<usize> = manager.partitions().iter().map(|p| p.len()).collect();
        assert_eq!(depths, vec![2, 2, 2, 2]);
    }

    #[test]
    fn backpressure_rejects_low_priority_past_threshold() {
        let config = QueueConfig {
            partitions: 1,
            backpressure_threshold: 2,
            ..QueueConfig::default()
        };
        let (manager, _bus) = manager(config);
        for i in 0..3 {
            manager
                .enqueue(Task::new(format!("t{i}"), TaskType::Parse, json!({}), 5))
                .unwrap();
        }
        let err = manager
            .enqueue(Task::new("t-overflow", TaskType::Parse, json!({}), 5))
            .unwrap_err();
        assert!(matches!(err, QueueError::Overflow { .. }));
    }

    #[test]
    fn backpressure_still_admits_high_priority() {
        let config = QueueConfig {
            partitions: 1,
            backpressure_threshold: 1,
            ..QueueConfig::default()
        };
        let (manager, _bus) = manager(config);
        manager
            .enqueue(Task::new("t0", TaskType::Parse, json!({}), 5))
            .unwrap();
        manager
            .enqueue(Task::new("t1", TaskType::Parse, json!({}), 5))
            .unwrap();
        // depth is now 2 > threshold 1; a priority-1 task still gets in.
        manager
            .enqueue(Task::new("urgent", TaskType::Parse, json!({}), 1))
            .unwrap();
    }

    #[test]
    fn requeue_bumps_retry_count_and_sets_not_before() {
        let config = QueueConfig {
            partitions: 1,
            ..QueueConfig::default()
        };
        let (manager, _bus) = manager(config);
        let task = Task::new("t0", TaskType::Parse, json!({}), 5);
        manager.requeue_with_backoff(task).unwrap();
        let requeued = manager.dequeue(0).unwrap();
        // not_before is in the future so it should not be ready yet.
        assert!(requeued.is_none());
    }

    #[test]
    fn exhausted_retries_are_not_requeued() {
        let config = QueueConfig {
            partitions: 1,
            ..QueueConfig::default()
        };
        let (manager, _bus) = manager(config);
        let mut task = Task::new("t0", TaskType::Parse, json!({}), 5).with_max_retries(1);
        task.retry_count = 1;
        assert!(manager.requeue_with_backoff(task).is_none());
    }
}
