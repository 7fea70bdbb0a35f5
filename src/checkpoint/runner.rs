//! C10: durable checkpoint job runner (spec §4.10).
//!
//! Submission is non-blocking: [`CheckpointJobRunner::submit`] persists
//! and enqueues the job, then hands the caller a `oneshot::Receiver` it
//! can await for the eventual outcome. Ordering is FIFO-within-session,
//! concurrent-across-sessions: every job goes through one shared `flume`
//! queue (so two jobs for the same session dequeue in submission order),
//! and each worker takes a per-session `tokio::sync::Mutex` before running
//! a job's body. Because job2 for a session can only dequeue after job1
//! (same queue, same order) and then blocks on the lock job1's worker
//! holds, job1's critical section always finishes first — ordering falls
//! out of the combination rather than needing its own scheduler.
//!
//! Grounded on [`crate::workers::pool::WorkerPool`] for the
//! shutdown-via-`watch` and per-worker `tokio::spawn` loop shape.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{instrument, warn};

use crate::config::CheckpointJobConfig;
use crate::event_bus::{Event, EventEmitter};
use crate::graph_adapter::{CreateCheckpointOptions, GraphServiceClient};
use crate::model::{CheckpointJob, CheckpointJobPayload, CheckpointJobStatus};
use crate::utils::id_generator::IdGenerator;

use super::error::CheckpointJobError;
use super::persistence::JobPersistence;

/// Terminal outcome of a checkpoint job, delivered to the `submit()`
/// caller through a oneshot channel.
#[derive(Debug, Clone)]
pub enum CheckpointOutcome {
    Completed { checkpoint_id: String },
    ManualIntervention { job_id: String, last_error: String },
}

struct SessionLocks {
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl SessionLocks {
    fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    fn get(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

struct QueuedJob {
    job_id: String,
}

pub struct CheckpointJobRunner {
    config: CheckpointJobConfig,
    graph: Arc<dyn GraphServiceClient>,
    persistence: Arc<dyn JobPersistence>,
    emitter: Arc<dyn EventEmitter>,
    ids: IdGenerator,
    jobs: DashMap<String, CheckpointJob>,
    session_locks: SessionLocks,
    waiters: DashMap<String, oneshot::Sender<CheckpointOutcome>>,
    sender: flume::Sender<QueuedJob>,
    receiver: flume::Receiver<QueuedJob>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    workers: AsyncMutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CheckpointJobRunner {
    pub fn new(
        config: CheckpointJobConfig,
        graph: Arc<dyn GraphServiceClient>,
        persistence: Arc<dyn JobPersistence>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Arc<Self> {
        let (sender, receiver) = flume::unbounded();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            config,
            graph,
            persistence,
            emitter,
            ids: IdGenerator::new(),
            jobs: DashMap::new(),
            session_locks: SessionLocks::new(),
            waiters: DashMap::new(),
            sender,
            receiver,
            shutdown_tx,
            shutdown_rx,
            workers: AsyncMutex::new(Vec::new()),
        })
    }

    /// Reload queued/running/pending jobs (re-queued as-is) and
    /// manual-intervention jobs (kept in the dead-letter map only, not
    /// requeued) from durable storage. Called once on startup so a
    /// process restart does not lose in-flight work (spec §4.10 invariant
    /// 6: "failed jobs are never silently dropped").
    #[instrument(skip(self), err)]
    pub async fn hydrate(&self) -> Result<(), CheckpointJobError> {
        self.persistence.initialize().await?;
        for job in self.persistence.load_pending().await? {
            self.jobs.insert(job.id.clone(), job.clone());
            let _ = self.sender.send(QueuedJob { job_id: job.id });
        }
        for job in self.persistence.load_dead_letters().await? {
            self.jobs.insert(job.id.clone(), job);
        }
        Ok(())
    }

    /// Spawn `concurrency` worker tasks consuming the shared queue.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        for _ in 0..self.config.concurrency.max(1) {
            let runner = Arc::clone(self);
            let mut shutdown_rx = self.shutdown_rx.clone();
            let receiver = self.receiver.clone();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        queued = receiver.recv_async() => {
                            match queued {
                                Ok(queued) => runner.run_job(&queued.job_id).await,
                                Err(_) => break,
                            }
                        }
                    }
                }
            });
            workers.push(handle);
        }
    }

    /// Enqueue a new checkpoint job; returns immediately with the job id
    /// and a receiver for the eventual [`CheckpointOutcome`].
    #[instrument(skip(self, payload), fields(session_id = %payload.session_id), err)]
    pub async fn submit(
        self: &Arc<Self>,
        payload: CheckpointJobPayload,
    ) -> Result<(String, oneshot::Receiver<CheckpointOutcome>), CheckpointJobError> {
        let job_id = self.ids.generate_job_id(chrono::Utc::now().timestamp_millis());
        let job = CheckpointJob::new(job_id.clone(), payload.clone());
        self.persistence.upsert(&job).await?;
        self.jobs.insert(job_id.clone(), job);

        let (tx, rx) = oneshot::channel();
        self.waiters.insert(job_id.clone(), tx);

        let _ = self.emitter.emit(Event::JobEnqueued(crate::event_bus::JobEnqueuedPayload {
            at: chrono::Utc::now(),
            job_id: job_id.clone(),
            session_id: payload.session_id.clone(),
        }));

        self.sender
            .send(QueuedJob { job_id: job_id.clone() })
            .map_err(|_| CheckpointJobError::QueueClosed)?;

        Ok((job_id, rx))
    }

    pub fn status(&self, job_id: &str) -> Option<CheckpointJobStatus> {
        self.jobs.get(job_id).map(|j| j.status)
    }

    fn notify(&self, job_id: &str, outcome: CheckpointOutcome) {
        if let Some((_, tx)) = self.waiters.remove(job_id) {
            let _ = tx.send(outcome);
        }
    }

    /// The five-step job body (spec §4.10): annotate pending, create the
    /// checkpoint, annotate with the real id, link the session, persist.
    /// Failure at any step records the attempt and either retries with
    /// backoff or, past `max_attempts`, moves to manual intervention.
    #[instrument(skip(self))]
    async fn run_job(self: &Arc<Self>, job_id: &str) {
        let Some(mut job) = self.jobs.get(job_id).map(|j| j.clone()) else {
            warn!(job_id, "checkpoint job vanished before execution");
            return;
        };

        let session_id = job.payload.session_id.clone();
        let lock = self.session_locks.get(&session_id);
        let _guard = lock.lock().await;

        job.transition(CheckpointJobStatus::Running);
        let _ = self.persistence.upsert(&job).await;
        self.jobs.insert(job_id.to_string(), job.clone());
        let _ = self.emitter.emit(Event::JobStarted(crate::event_bus::JobStartedPayload {
            at: chrono::Utc::now(),
            job_id: job_id.to_string(),
            attempt: job.attempts + 1,
        }));

        match self.execute_once(&job).await {
            Ok(checkpoint_id) => {
                job.transition(CheckpointJobStatus::Completed);
                let _ = self.persistence.delete(job_id).await;
                self.jobs.remove(job_id);
                let _ = self.emitter.emit(Event::JobCompleted(crate::event_bus::JobCompletedPayload {
                    at: chrono::Utc::now(),
                    job_id: job_id.to_string(),
                    checkpoint_id: checkpoint_id.clone(),
                }));
                self.notify(job_id, CheckpointOutcome::Completed { checkpoint_id });
            }
            Err(err) => {
                job.transition(CheckpointJobStatus::Pending);
                job.record_failure(err.to_string());
                let _ = self.emitter.emit(Event::JobAttemptFailed(crate::event_bus::JobAttemptFailedPayload {
                    at: chrono::Utc::now(),
                    job_id: job_id.to_string(),
                    attempt: job.attempts,
                    error: err.to_string(),
                }));

                if job.attempts < self.config.max_attempts {
                    job.transition(CheckpointJobStatus::Queued);
                    let _ = self.persistence.upsert(&job).await;
                    self.jobs.insert(job_id.to_string(), job.clone());
                    let runner = Arc::clone(self);
                    let job_id = job_id.to_string();
                    let delay = self.config.retry_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = runner.sender.send(QueuedJob { job_id });
                    });
                } else {
                    self.dead_letter(&mut job, &err).await;
                }
            }
        }
    }

    async fn execute_once(&self, job: &CheckpointJob) -> Result<String, CheckpointJobError> {
        let session_id = &job.payload.session_id;

        self.graph
            .annotate_session_relationships_with_checkpoint(session_id, "pending")
            .await?;

        let checkpoint_id = self
            .graph
            .create_checkpoint(
                &job.payload.seed_entity_ids,
                &CreateCheckpointOptions {
                    reason: job.payload.reason,
                    hops: job.payload.hop_count,
                    window: job.payload.window.clone(),
                },
            )
            .await?;

        self.graph
            .annotate_session_relationships_with_checkpoint(session_id, &checkpoint_id)
            .await?;

        let meta = job.payload.annotations.clone().unwrap_or(serde_json::json!({}));
        if let Err(err) = self.graph.create_session_checkpoint_link(session_id, &checkpoint_id, meta).await {
            // Orphaned checkpoint entity with no link: clean it up before
            // surfacing the failure so a retry doesn't pile up duplicates.
            let _ = self.graph.delete_checkpoint(&checkpoint_id).await;
            return Err(err.into());
        }

        Ok(checkpoint_id)
    }

    async fn dead_letter(self: &Arc<Self>, job: &mut CheckpointJob, err: &CheckpointJobError) {
        job.transition(CheckpointJobStatus::ManualIntervention);
        let _ = self
            .graph
            .annotate_session_relationships_with_checkpoint(&job.payload.session_id, "manual_intervention")
            .await;
        let _ = self.persistence.upsert(job).await;
        self.jobs.insert(job.id.clone(), job.clone());
        let _ = self.emitter.emit(Event::JobDeadLettered(crate::event_bus::JobDeadLetteredPayload {
            at: chrono::Utc::now(),
            job_id: job.id.clone(),
            attempts: job.attempts,
            last_error: err.to_string(),
        }));
        let _ = self.emitter.emit(Event::JobFailed(crate::event_bus::JobFailedPayload {
            at: chrono::Utc::now(),
            job_id: job.id.clone(),
            error: err.to_string(),
        }));
        self.notify(
            &job.id,
            CheckpointOutcome::ManualIntervention {
                job_id: job.id.clone(),
                last_error: err.to_string(),
            },
        );
    }

    /// List jobs currently parked in manual intervention (spec §4.10's
    /// dead-letter surface).
    pub fn dead_letters(&self) -> Vec<CheckpointJob> {
        self.jobs
            .iter()
            .filter(|e| e.status == CheckpointJobStatus::ManualIntervention)
            .map(|e| e.value().clone())
            .collect()
    }

    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            let abort_handle = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                abort_handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, MemorySink};
    use crate::graph_adapter::InMemoryGraphService;
    use crate::model::CheckpointReason;

    fn payload(session_id: &str) -> CheckpointJobPayload {
        CheckpointJobPayload {
            session_id: session_id.into(),
            seed_entity_ids: vec!["e1".into()],
            reason: CheckpointReason::Manual,
            hop_count: 2,
            window: None,
            annotations: None,
        }
    }

    fn runner() -> Arc<CheckpointJobRunner> {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        CheckpointJobRunner::new(
            CheckpointJobConfig::default(),
            Arc::new(InMemoryGraphService::new()),
            Arc::new(super::super::persistence::InMemoryJobPersistence::new()),
            bus.get_emitter(),
        )
    }

    #[tokio::test]
    async fn submit_completes_and_notifies() {
        let runner = runner();
        runner.start().await;
        let (_job_id, rx) = runner.submit(payload("s1")).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert!(matches!(outcome, CheckpointOutcome::Completed { .. }));
        runner.stop().await;
    }

    #[tokio::test]
    async fn jobs_for_same_session_complete_in_submission_order() {
        let runner = runner();
        runner.start().await;
        let (job_a, rx_a) = runner.submit(payload("s1")).await.unwrap();
        let (job_b, rx_b) = runner.submit(payload("s1")).await.unwrap();
        let a = tokio::time::timeout(Duration::from_secs(2), rx_a).await.unwrap().unwrap();
        let b = tokio::time::timeout(Duration::from_secs(2), rx_b).await.unwrap().unwrap();
        assert!(matches!(a, CheckpointOutcome::Completed { .. }));
        assert!(matches!(b, CheckpointOutcome::Completed { .. }));
        assert_ne!(job_a, job_b);
        runner.stop().await;
    }

    #[tokio::test]
    async fn exhausted_retries_land_in_manual_intervention() {
        struct AlwaysFailsCheckpoint(InMemoryGraphService);

        #[async_trait::async_trait]
        impl GraphServiceClient for AlwaysFailsCheckpoint {
            async fn create_entities_bulk(&self, e: &[crate::model::Entity], o: &crate::graph_adapter::BulkWriteOptions) -> crate::graph_adapter::Result<crate::graph_adapter::BulkWriteResult> {
                self.0.create_entities_bulk(e, o).await
            }
            async fn create_relationships_bulk(&self, r: &[crate::model::Relationship], o: &crate::graph_adapter::BulkWriteOptions) -> crate::graph_adapter::Result<crate::graph_adapter::BulkWriteResult> {
                self.0.create_relationships_bulk(r, o).await
            }
            async fn create_embeddings_batch(&self, e: &[crate::model::Entity], o: &crate::graph_adapter::BulkWriteOptions) -> crate::graph_adapter::Result<crate::graph_adapter::BulkWriteResult> {
                self.0.create_embeddings_batch(e, o).await
            }
            async fn create_entity(&self, e: &crate::model::Entity) -> crate::graph_adapter::Result<()> {
                self.0.create_entity(e).await
            }
            async fn create_relationship(&self, r: &crate::model::Relationship) -> crate::graph_adapter::Result<()> {
                self.0.create_relationship(r).await
            }
            async fn upsert_entity_json(&self, id: &str, v: serde_json::Value) -> crate::graph_adapter::Result<()> {
                self.0.upsert_entity_json(id, v).await
            }
            async fn delete_entity(&self, id: &str) -> crate::graph_adapter::Result<()> {
                self.0.delete_entity(id).await
            }
            async fn upsert_relationship_json(&self, id: &str, v: serde_json::Value) -> crate::graph_adapter::Result<()> {
                self.0.upsert_relationship_json(id, v).await
            }
            async fn delete_relationship(&self, id: &str) -> crate::graph_adapter::Result<()> {
                self.0.delete_relationship(id).await
            }
            async fn create_checkpoint(&self, _seed: &[String], _opts: &CreateCheckpointOptions) -> crate::graph_adapter::Result<String> {
                Err(crate::graph_adapter::GraphServiceError::Unavailable("down".into()))
            }
            async fn annotate_session_relationships_with_checkpoint(&self, s: &str, c: &str) -> crate::graph_adapter::Result<()> {
                self.0.annotate_session_relationships_with_checkpoint(s, c).await
            }
            async fn create_session_checkpoint_link(&self, s: &str, c: &str, m: serde_json::Value) -> crate::graph_adapter::Result<()> {
                self.0.create_session_checkpoint_link(s, c, m).await
            }
            async fn delete_checkpoint(&self, c: &str) -> crate::graph_adapter::Result<()> {
                self.0.delete_checkpoint(c).await
            }
            async fn query(&self, q: &str, p: serde_json::Value) -> crate::graph_adapter::Result<Vec<serde_json::Value>> {
                self.0.query(q, p).await
            }
        }

        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let mut config = CheckpointJobConfig::default();
        config.max_attempts = 2;
        config.retry_delay = Duration::from_millis(5);
        let runner = CheckpointJobRunner::new(
            config,
            Arc::new(AlwaysFailsCheckpoint(InMemoryGraphService::new())),
            Arc::new(super::super::persistence::InMemoryJobPersistence::new()),
            bus.get_emitter(),
        );
        runner.start().await;
        let (job_id, rx) = runner.submit(payload("s1")).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert!(matches!(outcome, CheckpointOutcome::ManualIntervention { .. }));
        assert_eq!(runner.status(&job_id), Some(CheckpointJobStatus::ManualIntervention));
        runner.stop().await;
    }
}
