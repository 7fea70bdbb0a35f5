use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::WorkerPoolConfig;
use crate::event_bus::{Event, EventEmitter};
use crate::model::TaskType;
use crate::queue::TaskQueueManager;

use super::error::WorkerPoolError;
use super::handler::{FailureSink, NullFailureSink, WorkerHandler};

struct PoolState {
    handles: Vec<JoinHandle<()>>,
    consecutive_errors: Vec<u32>,
    last_scale_up: Option<Instant>,
    last_scale_down: Option<Instant>,
}

/// Parallel task executors over [`TaskQueueManager`] partitions (spec
/// §4.2): workers are spawned as `tokio` tasks, each bound to one
/// partition index (`worker_id % partition_count`), matching the "only
/// per-partitionKey weak ordering" guarantee — no global ordering is
/// promised or needed across workers.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<TaskQueueManager>,
    handlers: Arc<FxHashMap<TaskType, Arc<dyn WorkerHandler>>>,
    emitter: Arc<dyn EventEmitter>,
    failure_sink: Arc<dyn FailureSink>,
    state: tokio::sync::Mutex<PoolState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<TaskQueueManager>,
        handlers: Vec<Arc<dyn WorkerHandler>>,
        emitter: Arc<dyn EventEmitter>,
        failure_sink: Arc<dyn FailureSink>,
    ) -> Self {
        let mut map = FxHashMap::default();
        for handler in handlers {
            map.insert(handler.worker_type(), handler);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            queue,
            handlers: Arc::new(map),
            emitter,
            failure_sink,
            state: tokio::sync::Mutex::new(PoolState {
                handles: Vec::new(),
                consecutive_errors: Vec::new(),
                last_scale_up: None,
                last_scale_down: None,
            }),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.state.lock().await.handles.len()
    }

    /// Bring the pool up to `min_workers` and start the auto-scaling loop
    /// (spec §4.2 — evaluated every `health_check_interval`).
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        for _ in 0..self.config.min_workers {
            self.spawn_worker_locked(&mut state);
        }
        drop(state);
        if self.config.auto_scale {
            self.spawn_scaling_loop();
        }
    }

    fn spawn_worker_locked(self: &Arc<Self>, state: &mut PoolState) {
        let worker_id = state.handles.len();
        let pool = Arc::clone(self);
        let restart_threshold = self.config.restart_threshold;
        let mut shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            let mut consecutive_errors: u32 = 0;
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    outcome = pool.run_one_cycle(worker_id) => {
                        match outcome {
                            WorkCycleOutcome::Idle => tokio::time::sleep(Duration::from_millis(25)).await,
                            WorkCycleOutcome::Succeeded => consecutive_errors = 0,
                            WorkCycleOutcome::Failed => {
                                consecutive_errors += 1;
                                if consecutive_errors > restart_threshold {
                                    // Restart is opaque to callers (spec §4.2): the worker
                                    // keeps its task/partition assignment, only its local
                                    // error streak resets.
                                    warn!(worker_id, consecutive_errors, "worker exceeded restart threshold; restarting");
                                    consecutive_errors = 0;
                                }
                            }
                        }
                    }
                }
            }
        });
        state.handles.push(handle);
        state.consecutive_errors.push(0);
    }

    /// Pull and execute one task for `worker_id`'s assigned partition.
    #[instrument(skip(self))]
    async fn run_one_cycle(&self, worker_id: usize) -> WorkCycleOutcome {
        let partitions = self.queue.partitions().len().max(1);
        let partition = worker_id % partitions;
        let task = match self.queue.dequeue(partition) {
            Ok(Some(task)) => task,
            Ok(None) => return WorkCycleOutcome::Idle,
            Err(err) => {
                warn!(%err, "worker dequeue failed");
                return WorkCycleOutcome::Idle;
            }
        };

        let Some(handler) = self.handlers.get(&task.task_type).cloned() else {
            warn!(task_id = %task.id, task_type = ?task.task_type, "no handler registered; dead-lettering");
            let error = WorkerPoolError::MissingHandler(task.task_type).to_string();
            self.failure_sink.on_exhausted(task, error);
            return WorkCycleOutcome::Failed;
        };

        let result = handler.execute(&task).await;
        if result.success {
            self.queue.counters().record_processed();
            WorkCycleOutcome::Succeeded
        } else {
            let error = result.error.clone().unwrap_or_else(|| "unknown worker error".to_string());
            if self.queue.requeue_with_backoff(task.clone()).is_none() {
                self.failure_sink.on_exhausted(task, error);
            }
            WorkCycleOutcome::Failed
        }
    }

    fn spawn_scaling_loop(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.health_check_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        pool.evaluate_scaling().await;
                    }
                }
            }
        });
    }

    async fn evaluate_scaling(self: &Arc<Self>) {
        let busy_fraction = self.estimate_busy_fraction();
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let current = state.handles.len();

        if busy_fraction >= self.config.scale_up.threshold
            && current < self.config.max_workers
            && state
                .last_scale_up
                .is_none_or(|t| now.duration_since(t) >= self.config.scale_up.cooldown)
        {
            self.spawn_worker_locked(&mut state);
            state.last_scale_up = Some(now);
            info!(workers = state.handles.len(), busy_fraction, "scaled worker pool up");
            let _ = self.emitter.emit(Event::metrics_updated(
                "workers",
                serde_json::json!({"workers": state.handles.len(), "action": "scale_up"}),
            ));
        } else if busy_fraction <= self.config.scale_down.threshold
            && current > self.config.min_workers
            && state
                .last_scale_down
                .is_none_or(|t| now.duration_since(t) >= self.config.scale_down.cooldown)
        {
            if let Some(handle) = state.handles.pop() {
                handle.abort();
                state.consecutive_errors.pop();
            }
            state.last_scale_down = Some(now);
            info!(workers = state.handles.len(), busy_fraction, "scaled worker pool down");
        }
    }

    fn estimate_busy_fraction(&self) -> f64 {
        let depth: usize = self.queue.partitions().iter().map(|p| p.len()).sum();
        if depth == 0 {
            0.0
        } else {
            (depth as f64 / (self.queue.partitions().len().max(1) as f64 * 10.0)).min(1.0)
        }
    }

    /// Signal cancellation and wait up to `worker_timeout` for workers to
    /// exit before aborting survivors (spec §5 — "force terminate").
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.handles)
        };
        for handle in handles {
            let abort_handle = handle.abort_handle();
            if tokio::time::timeout(self.config.worker_timeout, handle).await.is_err() {
                abort_handle.abort();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkCycleOutcome {
    Idle,
    Succeeded,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, MemorySink};
    use crate::model::{Task, TaskType, WorkerResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysSucceeds;

    #[async_trait]
    impl WorkerHandler for AlwaysSucceeds {
        fn worker_type(&self) -> TaskType {
            TaskType::Parse
        }

        async fn execute(&self, _task: &Task) -> WorkerResult {
            WorkerResult::ok(json!({"ok": true}), 1)
        }
    }

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl WorkerHandler for AlwaysFails {
        fn worker_type(&self) -> TaskType {
            TaskType::Parse
        }

        async fn execute(&self, _task: &Task) -> WorkerResult {
            self.calls.fetch_add(1, Ordering::Relaxed);
            WorkerResult::err("db down", 1)
        }
    }

    struct RecordingFailureSink {
        exhausted: parking_lot::Mutex<Vec<String>>,
    }

    impl FailureSink for RecordingFailureSink {
        fn on_exhausted(&self, task: Task, _error: String) {
            self.exhausted.lock().push(task.id);
        }
    }

    #[tokio::test]
    async fn successful_task_is_counted_processed() {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let queue = Arc::new(TaskQueueManager::new(
            crate::config::QueueConfig {
                partitions: 1,
                ..Default::default()
            },
            bus.get_emitter(),
        ));
        queue
            .enqueue(Task::new("t0", TaskType::Parse, json!({}), 5))
            .unwrap();
        let pool = Arc::new(WorkerPool::new(
            crate::config::WorkerPoolConfig::default(),
            Arc::clone(&queue),
            vec![Arc::new(AlwaysSucceeds)],
            bus.get_emitter(),
            Arc::new(super::super::handler::NullFailureSink),
        ));
        let outcome = pool.run_one_cycle(0).await;
        assert_eq!(outcome, WorkCycleOutcome::Succeeded);
        assert_eq!(queue.counters().processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn exhausted_task_reaches_failure_sink() {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let queue = Arc::new(TaskQueueManager::new(
            crate::config::QueueConfig {
                partitions: 1,
                ..Default::default()
            },
            bus.get_emitter(),
        ));
        queue
            .enqueue(Task::new("t0", TaskType::Parse, json!({}), 5).with_max_retries(0))
            .unwrap();
        let sink = Arc::new(RecordingFailureSink {
            exhausted: parking_lot::Mutex::new(Vec::new()),
        });
        let pool = Arc::new(WorkerPool::new(
            crate::config::WorkerPoolConfig::default(),
            Arc::clone(&queue),
            vec![Arc::new(AlwaysFails {
                calls: AtomicU32::new(0),
            })],
            bus.get_emitter(),
            Arc::clone(&sink) as Arc<dyn FailureSink>,
        ));
        let outcome = pool.run_one_cycle(0).await;
        assert_eq!(outcome, WorkCycleOutcome::Failed);
        assert_eq!(sink.exhausted.lock().as_slice(), ["t0"]);
    }
}
