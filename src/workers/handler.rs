use async_trait::async_trait;

use crate::model::{Task, TaskType, WorkerResult};

/// One worker-type executor (spec §4.2): "accepts one task, runs it to a
/// `WorkerResult`, never keeps state across tasks beyond connection
/// handles." Grounded on `weavegraph::node::Node` — same single-method,
/// stateless-per-call shape, generalized from workflow nodes to task
/// handlers keyed by [`TaskType`].
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    fn worker_type(&self) -> TaskType;

    async fn execute(&self, task: &Task) -> WorkerResult;
}

/// Notified when a task exhausts its retries inside the pool (spec §4.3 —
/// ownership of what happens next, e.g. dead-lettering, belongs to C3;
/// the pool only reports the fact).
pub trait FailureSink: Send + Sync {
    fn on_exhausted(&self, task: Task, error: String);
}

/// A [`FailureSink`] that drops reports; useful for tests and for
/// pipelines that have not wired C3 yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFailureSink;

impl FailureSink for NullFailureSink {
    fn on_exhausted(&self, _task: Task, _error: String) {}
}
