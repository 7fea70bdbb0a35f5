//! Shared fixtures for the scenario and property test binaries, mirroring
//! the layout of the teacher's own `tests/common/`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use kgraph_ingest::graph_adapter::{
    BulkWriteOptions, BulkWriteResult, CreateCheckpointOptions, GraphServiceClient,
    InMemoryGraphService, Result as GraphResult,
};
use kgraph_ingest::model::{Entity, Relationship, Version};
use kgraph_ingest::workers::{FailureSink, WorkerHandler};
use kgraph_ingest::model::{Task, TaskType, WorkerResult};

/// A [`WorkerHandler`] that fails its first `fail_times` calls, then
/// succeeds forever after. Used to drive S1 (retry-then-success)
/// without depending on wall-clock-sensitive externals.
pub struct FlakyHandler {
    kind: TaskType,
    calls: AtomicU32,
    fail_times: u32,
}

impl FlakyHandler {
    pub fn new(kind: TaskType, fail_times: u32) -> Self {
        Self {
            kind,
            calls: AtomicU32::new(0),
            fail_times,
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkerHandler for FlakyHandler {
    fn worker_type(&self) -> TaskType {
        self.kind
    }

    async fn execute(&self, _task: &Task) -> WorkerResult {
        let attempt = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if attempt <= self.fail_times {
            WorkerResult::err("upstream graph service unavailable", 1)
        } else {
            WorkerResult::ok(serde_json::json!({"attempt": attempt}), 1)
        }
    }
}

/// A [`WorkerHandler`] that always fails; used to drive S2 (DLQ).
pub struct AlwaysFailsHandler {
    kind: TaskType,
}

impl AlwaysFailsHandler {
    pub fn new(kind: TaskType) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl WorkerHandler for AlwaysFailsHandler {
    fn worker_type(&self) -> TaskType {
        self.kind
    }

    async fn execute(&self, _task: &Task) -> WorkerResult {
        WorkerResult::err("db down", 1)
    }
}

/// A [`WorkerHandler`] that always succeeds; used on the "recovered"
/// side of S2's resubmit-after-DLQ flow.
pub struct AlwaysSucceedsHandler {
    kind: TaskType,
}

impl AlwaysSucceedsHandler {
    pub fn new(kind: TaskType) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl WorkerHandler for AlwaysSucceedsHandler {
    fn worker_type(&self) -> TaskType {
        self.kind
    }

    async fn execute(&self, _task: &Task) -> WorkerResult {
        WorkerResult::ok(serde_json::json!({"ok": true}), 1)
    }
}

/// Routes exhausted tasks into the id list, the way
/// [`kgraph_ingest::resilience::ErrorHandler::dead_letter`] is wired from
/// the pipeline's own `PipelineFailureSink`.
pub struct RecordingFailureSink {
    pub exhausted: Mutex<Vec<(Task, String)>>,
}

impl RecordingFailureSink {
    pub fn new() -> Self {
        Self {
            exhausted: Mutex::new(Vec::new()),
        }
    }
}

impl FailureSink for RecordingFailureSink {
    fn on_exhausted(&self, task: Task, error: String) {
        self.exhausted.lock().push((task, error));
    }
}

/// Wraps [`InMemoryGraphService`] and records the order in which writes
/// land, so a DAG-ordering assertion can check actual call order rather
/// than just post-hoc counts (spec §4.4 invariant: entities before a
/// relationship that depends on them).
pub struct OrderTrackingGraph {
    inner: InMemoryGraphService,
    pub order: Mutex<Vec<&'static str>>,
}

impl OrderTrackingGraph {
    pub fn new() -> Self {
        Self {
            inner: InMemoryGraphService::new(),
            order: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GraphServiceClient for OrderTrackingGraph {
    async fn create_entities_bulk(&self, entities: &[Entity], opts: &BulkWriteOptions) -> GraphResult<BulkWriteResult> {
        self.order.lock().push("entity");
        self.inner.create_entities_bulk(entities, opts).await
    }

    async fn create_relationships_bulk(&self, relationships: &[Relationship], opts: &BulkWriteOptions) -> GraphResult<BulkWriteResult> {
        self.order.lock().push("relationship");
        self.inner.create_relationships_bulk(relationships, opts).await
    }

    async fn create_embeddings_batch(&self, entities: &[Entity], opts: &BulkWriteOptions) -> GraphResult<BulkWriteResult> {
        self.inner.create_embeddings_batch(entities, opts).await
    }

    async fn create_entity(&self, entity: &Entity) -> GraphResult<()> {
        self.order.lock().push("entity");
        self.inner.create_entity(entity).await
    }

    async fn create_relationship(&self, relationship: &Relationship) -> GraphResult<()> {
        self.order.lock().push("relationship");
        self.inner.create_relationship(relationship).await
    }

    async fn upsert_entity_json(&self, entity_id: &str, value: Value) -> GraphResult<()> {
        self.inner.upsert_entity_json(entity_id, value).await
    }

    async fn delete_entity(&self, entity_id: &str) -> GraphResult<()> {
        self.inner.delete_entity(entity_id).await
    }

    async fn upsert_relationship_json(&self, relationship_id: &str, value: Value) -> GraphResult<()> {
        self.inner.upsert_relationship_json(relationship_id, value).await
    }

    async fn delete_relationship(&self, relationship_id: &str) -> GraphResult<()> {
        self.inner.delete_relationship(relationship_id).await
    }

    async fn create_checkpoint(&self, seed_entity_ids: &[String], opts: &CreateCheckpointOptions) -> GraphResult<String> {
        self.inner.create_checkpoint(seed_entity_ids, opts).await
    }

    async fn annotate_session_relationships_with_checkpoint(&self, session_id: &str, checkpoint_id_or_label: &str) -> GraphResult<()> {
        self.inner.annotate_session_relationships_with_checkpoint(session_id, checkpoint_id_or_label).await
    }

    async fn create_session_checkpoint_link(&self, session_id: &str, checkpoint_id: &str, meta: Value) -> GraphResult<()> {
        self.inner.create_session_checkpoint_link(session_id, checkpoint_id, meta).await
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> GraphResult<()> {
        self.inner.delete_checkpoint(checkpoint_id).await
    }

    async fn query(&self, query_string: &str, params: Value) -> GraphResult<Vec<Value>> {
        self.inner.query(query_string, params).await
    }

    async fn record_versions(&self, versions: &[Version]) -> GraphResult<()> {
        self.inner.record_versions(versions).await
    }

    fn supports_bulk(&self) -> bool {
        self.inner.supports_bulk()
    }
}
