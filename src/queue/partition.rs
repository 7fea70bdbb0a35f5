use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::Task;

/// Wraps a [`Task`] for priority-heap ordering: lower `priority` number
/// dequeues first (spec §4.1 — "Priority 0 = highest"), ties broken by
/// earlier `enqueued_at`. `std::collections::BinaryHeap` is a max-heap,
/// so both fields are negated via `Reverse`-style comparison in `Ord`.
struct HeapItem(Task);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.enqueued_at == other.0.enqueued_at
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .priority
            .cmp(&self.0.priority)
            .then_with(|| other.0.enqueued_at.cmp(&self.0.enqueued_at))
    }
}

/// One partition's task storage: O(log n) insert, O(n) worst-case ready
/// dequeue (bounded by how many not-yet-ready tasks sit ahead of the next
/// ready one — see [`Partition::dequeue_ready`]).
#[derive(Default)]
pub struct Partition {
    heap: Mutex<BinaryHeap<HeapItem>>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        self.heap.lock().push(HeapItem(task));
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn oldest_enqueued_at(&self) -> Option<DateTime<Utc>> {
        self.heap.lock().iter().map(|item| item.0.enqueued_at).min()
    }

    /// Pop the highest-priority task whose `not_before <= now`, deferring
    /// (and re-pushing) any higher-priority task that isn't ready yet.
    pub fn dequeue_ready(&self, now: DateTime<Utc>) -> Option<Task> {
        let mut heap = self.heap.lock();
        let mut deferred = Vec::new();
        let mut found = None;
        while let Some(item) = heap.pop() {
            if item.0.is_ready(now) {
                found = Some(item.0);
                break;
            }
            deferred.push(item);
        }
        for item in deferred {
            heap.push(item);
        }
        found
    }

    /// Dequeue up to `max_batch` ready tasks.
    pub fn dequeue_batch(&self, now: DateTime<Utc>, max_batch: usize) -> Vec<Task> {
        let mut batch = Vec::with_capacity(max_batch.min(16));
        while batch.len() < max_batch {
            match self.dequeue_ready(now) {
                Some(task) => batch.push(task),
                None => break,
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;
    use serde_json::json;

    fn task(id: &str, priority: u8) -> Task {
        Task::new(id, TaskType::Parse, json!({}), priority)
    }

    #[test]
    fn dequeues_highest_priority_first() {
        let partition = Partition::new();
        partition.push(task("low", 9));
        partition.push(task("high", 0));
        partition.push(task("mid", 5));
        let now = Utc::now();
        assert_eq!(partition.dequeue_ready(now).unwrap().id, "high");
        assert_eq!(partition.dequeue_ready(now).unwrap().id, "mid");
        assert_eq!(partition.dequeue_ready(now).unwrap().id, "low");
    }

    #[test]
    fn defers_tasks_not_yet_ready() {
        let partition = Partition::new();
        let now = Utc::now();
        let mut future_task = task("future", 0);
        future_task.not_before = Some(now + chrono::Duration::seconds(60));
        partition.push(future_task);
        partition.push(task("ready", 5));
        assert_eq!(partition.dequeue_ready(now).unwrap().id, "ready");
        assert!(partition.dequeue_ready(now).is_none());
        assert_eq!(partition.len(), 1);
    }
}
