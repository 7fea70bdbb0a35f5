use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};

#[derive(Debug, Error, Diagnostic)]
pub enum WorkerPoolError {
    #[error("no handler registered for task type {0:?}")]
    #[diagnostic(
        code(kgraph_ingest::workers::missing_handler),
        help("register a WorkerHandler for this TaskType before starting the pool")
    )]
    MissingHandler(crate::model::TaskType),

    #[error("worker pool shut down before task {0} completed")]
    #[diagnostic(code(kgraph_ingest::workers::shutting_down))]
    ShuttingDown(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Queue(#[from] crate::queue::QueueError),
}

impl ToStructuredError for WorkerPoolError {
    fn to_structured(&self) -> StructuredError {
        match self {
            WorkerPoolError::MissingHandler(_) => {
                StructuredError::new("WORKER_MISSING_HANDLER", self.to_string(), ErrorKind::Programmer)
            }
            WorkerPoolError::ShuttingDown(_) => {
                StructuredError::new("WORKER_POOL_SHUTTING_DOWN", self.to_string(), ErrorKind::Transient)
            }
            WorkerPoolError::Queue(inner) => inner.to_structured(),
        }
    }
}
