use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};
use crate::graph_adapter::GraphServiceError;

/// Errors from the C11 rollback manager (spec §4.11).
#[derive(Debug, Error, Diagnostic)]
pub enum RollbackError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphServiceError),

    #[error("rollback point {0} not found")]
    #[diagnostic(code(kgraph_ingest::rollback::point_not_found))]
    PointNotFound(String),

    #[error("rollback operation {0} not found")]
    #[diagnostic(code(kgraph_ingest::rollback::operation_not_found))]
    OperationNotFound(String),

    #[error("rollback point {0} has an operation already in progress")]
    #[diagnostic(code(kgraph_ingest::rollback::operation_in_progress))]
    OperationInProgress(String),

    #[error("rollback operation {0} is not in progress and cannot be cancelled")]
    #[diagnostic(code(kgraph_ingest::rollback::not_cancellable))]
    NotCancellable(String),

    #[error("conflict at {path} could not be resolved: {reason}")]
    #[diagnostic(code(kgraph_ingest::rollback::unresolved_conflict))]
    UnresolvedConflict { path: String, reason: String },

    #[error("snapshot serialization error: {0}")]
    #[diagnostic(code(kgraph_ingest::rollback::snapshot))]
    Snapshot(String),
}

impl ToStructuredError for RollbackError {
    fn to_structured(&self) -> StructuredError {
        match self {
            RollbackError::Graph(inner) => inner.to_structured(),
            RollbackError::PointNotFound(_) => {
                StructuredError::new("ROLLBACK_POINT_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            RollbackError::OperationNotFound(_) => {
                StructuredError::new("ROLLBACK_OPERATION_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            RollbackError::OperationInProgress(_) => {
                StructuredError::new("ROLLBACK_OPERATION_IN_PROGRESS", self.to_string(), ErrorKind::Consistency)
            }
            RollbackError::NotCancellable(_) => {
                StructuredError::new("ROLLBACK_NOT_CANCELLABLE", self.to_string(), ErrorKind::Business)
            }
            RollbackError::UnresolvedConflict { .. } => {
                StructuredError::new("ROLLBACK_UNRESOLVED_CONFLICT", self.to_string(), ErrorKind::Business)
            }
            RollbackError::Snapshot(_) => {
                StructuredError::new("ROLLBACK_SNAPSHOT_ERROR", self.to_string(), ErrorKind::Programmer)
            }
        }
    }
}
