use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};
use crate::graph_adapter::GraphServiceError;

/// Errors from the C10 checkpoint job runner (spec §4.10).
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointJobError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphServiceError),

    #[error("checkpoint job {0} not found")]
    #[diagnostic(code(kgraph_ingest::checkpoint::not_found))]
    NotFound(String),

    #[error("checkpoint job queue is closed")]
    #[diagnostic(code(kgraph_ingest::checkpoint::queue_closed))]
    QueueClosed,

    #[error("job persistence error: {0}")]
    #[diagnostic(code(kgraph_ingest::checkpoint::persistence))]
    Persistence(String),
}

impl ToStructuredError for CheckpointJobError {
    fn to_structured(&self) -> StructuredError {
        match self {
            CheckpointJobError::Graph(inner) => inner.to_structured(),
            CheckpointJobError::NotFound(_) => {
                StructuredError::new("CHECKPOINT_JOB_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            CheckpointJobError::QueueClosed => {
                StructuredError::new("CHECKPOINT_JOB_QUEUE_CLOSED", self.to_string(), ErrorKind::Capacity)
            }
            CheckpointJobError::Persistence(_) => {
                StructuredError::new("CHECKPOINT_JOB_PERSISTENCE_ERROR", self.to_string(), ErrorKind::DurableServiceFailure)
            }
        }
    }
}
