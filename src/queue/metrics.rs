use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::manager::TaskQueueManager;

/// Per-partition and aggregate figures exposed by [`TaskQueueManager::metrics`]
/// (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub partition_depths: Vec<usize>,
    pub oldest_task_age_ms: Option<i64>,
    pub processed_total: u64,
    pub errors_total: u64,
    pub backpressure_active: bool,
}

impl QueueMetrics {
    pub fn error_rate(&self) -> f64 {
        let total = self.processed_total + self.errors_total;
        if total == 0 {
            0.0
        } else {
            self.errors_total as f64 / total as f64
        }
    }
}

/// Running counters a [`TaskQueueManager`] updates on every dequeue/requeue.
#[derive(Debug, Default)]
pub struct QueueCounters {
    pub processed: AtomicU64,
    pub errors: AtomicU64,
}

impl QueueCounters {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn snapshot(manager: &TaskQueueManager) -> QueueMetrics {
    let now = Utc::now();
    let partition_depths: Vec<usize> = manager.partitions().iter().map(|p| p.len()).collect();
    let oldest_task_age_ms = manager
        .partitions()
        .iter()
        .filter_map(|p| p.oldest_enqueued_at())
        .min()
        .map(|oldest| (now - oldest).num_milliseconds());
    let total_depth: usize = partition_depths.iter().sum();
    QueueMetrics {
        partition_depths,
        oldest_task_age_ms,
        processed_total: manager.counters().processed.load(Ordering::Relaxed),
        errors_total: manager.counters().errors.load(Ordering::Relaxed),
        backpressure_active: manager.config().enable_backpressure
            && total_depth > manager.config().backpressure_threshold,
    }
}

pub const fn default_metrics_interval() -> Duration {
    Duration::from_secs(5)
}
