//! C5: the ingestion pipeline orchestrator (spec §4.5). Wires C1
//! (queue), C2 (workers), C3 (error handler) and C4 (batch processor)
//! together behind the lifecycle and ingress surface spec.md names.
//!
//! Grounded on `weavegraph::runtimes::runner::AppRunner`: a struct that
//! owns the moving parts (sessions there, queue/workers/batch here) plus
//! an `EventBus`, with explicit `start`/lifecycle methods rather than a
//! free function.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::config::{BatchConfig, IngestConfig};
use crate::event_bus::EventEmitter;
use crate::graph_adapter::{GraphAdapterOptions, GraphServiceClient, GraphWriteAdapter};
use crate::model::{ChangeEvent, ChangeFragment, Task, TaskType, WorkerResult};
use crate::resilience::ErrorHandler;
use crate::queue::TaskQueueManager;
use crate::utils::id_generator::IdGenerator;
use crate::workers::{FailureSink, WorkerHandler, WorkerPool};
use crate::batch::BatchProcessor;

use super::error::IngestionError;
use super::extractor::FragmentExtractor;
use super::metrics::{self, LatencySampler, PipelineCounters, PipelineSnapshot, QueueMetricsView};
use super::priority::compute_priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initialized,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Paused => "paused",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        write!(f, "{label}")
    }
}

struct TimedExtractionHandler {
    kind: TaskType,
    extractor: Arc<dyn FragmentExtractor>,
    batch: Arc<BatchProcessor>,
    latency: Arc<LatencySampler>,
}

#[async_trait]
impl WorkerHandler for TimedExtractionHandler {
    fn worker_type(&self) -> TaskType {
        self.kind
    }

    async fn execute(&self, task: &Task) -> WorkerResult {
        let started = std::time::Instant::now();
        let result = self.run(task).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        self.latency.record(duration_ms);
        match result {
            Ok(count) => WorkerResult::ok(serde_json::json!({"fragmentsWritten": count}), duration_ms),
            Err(err) => WorkerResult::err(err.to_string(), duration_ms),
        }
    }
}

impl TimedExtractionHandler {
    async fn run(&self, task: &Task) -> Result<usize, IngestionError> {
        let event: ChangeEvent = serde_json::from_value(task.payload.clone()).map_err(|e| IngestionError::Extraction(e.to_string()))?;
        let fragments = self.extractor.extract(&event).await?;
        if fragments.is_empty() {
            return Ok(0);
        }
        let result = self.batch.process_fragments(&event.event_id, fragments).await?;
        Ok(result.processed)
    }
}

struct PipelineFailureSink {
    errors: Arc<ErrorHandler>,
}

impl FailureSink for PipelineFailureSink {
    fn on_exhausted(&self, task: Task, error: String) {
        self.errors.dead_letter(task, error);
    }
}

/// Orchestrator wiring C1–C4 (spec §4.5). Owns the queue, worker pool,
/// batch processor, and error handler; exposes change-event ingress,
/// lifecycle control, and periodic metrics/alerts.
pub struct IngestionPipeline {
    config: crate::config::PipelineConfig,
    queue: Arc<TaskQueueManager>,
    workers: Arc<WorkerPool>,
    batch: Arc<BatchProcessor>,
    errors: Arc<ErrorHandler>,
    emitter: Arc<dyn EventEmitter>,
    state: Mutex<PipelineState>,
    counters: PipelineCounters,
    latency: Arc<LatencySampler>,
    metrics_task: Mutex<Option<JoinHandle<()>>>,
    ids: IdGenerator,
}

impl IngestionPipeline {
    pub fn new(
        config: &IngestConfig,
        graph_client: Arc<dyn GraphServiceClient>,
        extractor: Arc<dyn FragmentExtractor>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<Self> {
        Self::with_batch_config(config, config.batch.clone(), graph_client, extractor, emitter)
    }

    fn with_batch_config(
        config: &IngestConfig,
        batch_config: BatchConfig,
        graph_client: Arc<dyn GraphServiceClient>,
        extractor: Arc<dyn FragmentExtractor>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<Self> {
        let queue = Arc::new(TaskQueueManager::new(config.queue.clone(), Arc::clone(&emitter)));
        let errors = Arc::new(ErrorHandler::new(config.errors.clone(), Arc::clone(&emitter)));
        let adapter = Arc::new(GraphWriteAdapter::new(graph_client, GraphAdapterOptions::default()));
        let batch = Arc::new(BatchProcessor::new(batch_config, adapter, Arc::clone(&emitter)));
        let latency = Arc::new(LatencySampler::default());

        let parse_handler: Arc<dyn WorkerHandler> = Arc::new(TimedExtractionHandler {
            kind: TaskType::Parse,
            extractor: Arc::clone(&extractor),
            batch: Arc::clone(&batch),
            latency: Arc::clone(&latency),
        });
        let enrich_handler: Arc<dyn WorkerHandler> = Arc::new(TimedExtractionHandler {
            kind: TaskType::Enrich,
            extractor,
            batch: Arc::clone(&batch),
            latency: Arc::clone(&latency),
        });
        let failure_sink = Arc::new(PipelineFailureSink { errors: Arc::clone(&errors) });
        let workers = Arc::new(WorkerPool::new(
            config.workers.clone(),
            Arc::clone(&queue),
            vec![parse_handler, enrich_handler],
            Arc::clone(&emitter),
            failure_sink,
        ));

        Arc::new(Self {
            config: config.pipeline.clone(),
            queue,
            workers,
            batch,
            errors,
            emitter,
            state: Mutex::new(PipelineState::Initialized),
            counters: PipelineCounters::default(),
            latency,
            metrics_task: Mutex::new(None),
            ids: IdGenerator::new(),
        })
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    fn require_running(&self) -> Result<(), IngestionError> {
        match *self.state.lock() {
            PipelineState::Running => Ok(()),
            PipelineState::Paused => Err(IngestionError::Paused),
            other => Err(IngestionError::NotRunning { state: other.to_string() }),
        }
    }

    /// Compute priority, enqueue a `parse` task (spec §4.5).
    #[instrument(skip(self, event), fields(event_id = %event.event_id), err)]
    pub fn ingest_change_event(&self, event: ChangeEvent) -> Result<(), IngestionError> {
        self.require_running()?;
        let priority = compute_priority(&event);
        let task = Task::new(self.ids.generate_uuid(), TaskType::Parse, serde_json::to_value(&event).unwrap_or_default(), priority)
            .with_partition_key(event.path.clone());
        self.queue.enqueue(task)?;
        self.counters.record_ingested();
        Ok(())
    }

    pub fn ingest_change_events(&self, events: Vec<ChangeEvent>) -> Result<(), IngestionError> {
        for event in events {
            self.ingest_change_event(event)?;
        }
        Ok(())
    }

    /// Bypass parsing and submit fragments directly to C4 (spec §4.5).
    #[instrument(skip(self, fragments), fields(event_id, count = fragments.len()), err)]
    pub async fn process_change_fragments(&self, event_id: &str, fragments: Vec<ChangeFragment>) -> Result<(), IngestionError> {
        if matches!(*self.state.lock(), PipelineState::Stopping | PipelineState::Stopped) {
            return Err(IngestionError::NotRunning { state: self.state().to_string() });
        }
        let count = fragments.len() as u64;
        self.batch.process_fragments(event_id, fragments).await?;
        self.counters.record_fragments_processed(count);
        Ok(())
    }

    /// Route a task to the low-priority enrichment lane (spec §4.5).
    pub fn schedule_enrichment(&self, event: ChangeEvent) -> Result<(), IngestionError> {
        self.require_running()?;
        let task = Task::new(self.ids.generate_uuid(), TaskType::Enrich, serde_json::to_value(&event).unwrap_or_default(), self.config.enrichment_priority)
            .with_partition_key(event.path.clone());
        self.queue.enqueue(task)?;
        self.counters.record_enrichment_scheduled();
        Ok(())
    }

    /// `initialized|stopped -> running`; starts the worker pool and the
    /// periodic metrics/alert loop.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state == PipelineState::Running {
                return;
            }
            *state = PipelineState::Running;
        }
        self.workers.start().await;
        self.spawn_metrics_loop();
    }

    fn spawn_metrics_loop(self: &Arc<Self>) {
        let pipeline = Arc::clone(self);
        let interval = self.config.metrics_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if matches!(pipeline.state(), PipelineState::Stopping | PipelineState::Stopped) {
                    break;
                }
                pipeline.publish_metrics();
            }
        });
        *self.metrics_task.lock() = Some(handle);
    }

    fn publish_metrics(&self) {
        let queue_metrics = self.queue.metrics();
        let snapshot = PipelineSnapshot {
            events_ingested: self.counters.events_ingested.load(std::sync::atomic::Ordering::Relaxed),
            fragments_processed: self.counters.fragments_processed.load(std::sync::atomic::Ordering::Relaxed),
            enrichment_scheduled: self.counters.enrichment_scheduled.load(std::sync::atomic::Ordering::Relaxed),
            queue: QueueMetricsView::from(&queue_metrics),
            p95_latency_ms: self.latency.p95_ms(),
        };
        metrics::publish(&snapshot, &self.config, self.emitter.as_ref());
    }

    pub fn metrics_snapshot(&self) -> PipelineSnapshot {
        let queue_metrics = self.queue.metrics();
        PipelineSnapshot {
            events_ingested: self.counters.events_ingested.load(std::sync::atomic::Ordering::Relaxed),
            fragments_processed: self.counters.fragments_processed.load(std::sync::atomic::Ordering::Relaxed),
            enrichment_scheduled: self.counters.enrichment_scheduled.load(std::sync::atomic::Ordering::Relaxed),
            queue: QueueMetricsView::from(&queue_metrics),
            p95_latency_ms: self.latency.p95_ms(),
        }
    }

    /// `running -> paused`: stop accepting new events; in-flight tasks
    /// and queue drains continue (spec §4.5).
    pub fn pause(&self) -> Result<(), IngestionError> {
        let mut state = self.state.lock();
        if *state != PipelineState::Running {
            return Err(IngestionError::NotRunning { state: state.to_string() });
        }
        *state = PipelineState::Paused;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), IngestionError> {
        let mut state = self.state.lock();
        if *state != PipelineState::Paused {
            return Err(IngestionError::NotRunning { state: state.to_string() });
        }
        *state = PipelineState::Running;
        Ok(())
    }

    /// `running|paused -> stopping -> stopped`: stop accepting events,
    /// signal workers to cancel, and wait up to `shutdownTimeout` before
    /// forcing termination (spec §5).
    pub async fn stop(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if matches!(*state, PipelineState::Stopped | PipelineState::Stopping) {
                return;
            }
            *state = PipelineState::Stopping;
        }
        let metrics_task = self.metrics_task.lock().take();
        if let Some(handle) = metrics_task {
            handle.abort();
        }
        self.workers.stop().await;
        *self.state.lock() = PipelineState::Stopped;
    }

    /// Poll until the queue is fully drained or `timeout` elapses.
    pub async fn wait_for_completion(&self, timeout: Duration) -> Result<(), IngestionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let depth: usize = self.queue.metrics().partition_depths.iter().sum();
            if depth == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(IngestionError::DrainTimeout { waited_ms: timeout.as_millis() as u64 });
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, MemorySink};
    use crate::graph_adapter::InMemoryGraphService;
    use crate::model::ChangeEventKind;
    use serde_json::json;

    fn test_pipeline() -> (Arc<IngestionPipeline>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let mut config = IngestConfig::default();
        config.workers.min_workers = 1;
        config.pipeline.metrics_interval = Duration::from_millis(20);
        let client = Arc::new(InMemoryGraphService::new());
        let pipeline = IngestionPipeline::new(&config, client, Arc::new(super::super::extractor::NullFragmentExtractor), bus.get_emitter());
        (pipeline, bus)
    }

    #[tokio::test]
    async fn ingest_before_start_is_rejected() {
        let (pipeline, _bus) = test_pipeline();
        let event = ChangeEvent::new("e1", "watcher", ChangeEventKind::FileChanged, "src/lib.rs");
        let err = pipeline.ingest_change_event(event).unwrap_err();
        assert!(matches!(err, IngestionError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn paused_pipeline_rejects_new_events_but_not_shutdown() {
        let (pipeline, _bus) = test_pipeline();
        pipeline.start().await;
        pipeline.pause().unwrap();
        let event = ChangeEvent::new("e1", "watcher", ChangeEventKind::FileChanged, "src/lib.rs");
        assert!(matches!(pipeline.ingest_change_event(event).unwrap_err(), IngestionError::Paused));
        pipeline.stop().await;
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn process_change_fragments_bypasses_parsing() {
        let (pipeline, _bus) = test_pipeline();
        pipeline.start().await;
        let entity = crate::model::Entity::File(crate::model::entity::EntityEnvelope::new("e1"));
        let fragment = ChangeFragment::new(
            "f1",
            "evt1",
            crate::model::FragmentChangeType::Entity,
            crate::model::FragmentOperation::Add,
            json!(entity),
        );
        pipeline.process_change_fragments("evt1", vec![fragment]).await.unwrap();
        assert_eq!(pipeline.metrics_snapshot().fragments_processed, 1);
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn wait_for_completion_times_out_on_stuck_backlog() {
        let (pipeline, _bus) = test_pipeline();
        // No workers registered for this partition key's task type here since
        // we never start(), so the task sits in queue forever.
        let task = Task::new("t1", TaskType::EntityUpsert, json!({}), 5);
        pipeline.queue.enqueue(task).unwrap();
        let err = pipeline.wait_for_completion(Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, IngestionError::DrainTimeout { .. }));
    }
}
