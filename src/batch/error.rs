use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};

#[derive(Debug, Error, Diagnostic)]
pub enum BatchError {
    #[error("dependency cycle detected among fragments of event {event_id}")]
    #[diagnostic(
        code(kgraph_ingest::batch::dependency_cycle),
        help("break the cycle in dependencyHints; no writes were performed for this event")
    )]
    DependencyCycle { event_id: String },

    #[error("batch {batch_id} already applied within idempotency TTL")]
    #[diagnostic(code(kgraph_ingest::batch::duplicate))]
    DuplicateBatch { batch_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] crate::graph_adapter::GraphServiceError),
}

impl ToStructuredError for BatchError {
    fn to_structured(&self) -> StructuredError {
        match self {
            BatchError::DependencyCycle { .. } => {
                StructuredError::new("DEPENDENCY_CYCLE", self.to_string(), ErrorKind::Consistency)
            }
            BatchError::DuplicateBatch { .. } => {
                StructuredError::new("IDEMPOTENCY_VIOLATION", self.to_string(), ErrorKind::Consistency)
            }
            BatchError::Graph(inner) => inner.to_structured(),
        }
    }
}

/// Per-item outcome of a partially-failed batch (spec §4.4): items that
/// failed are returned individually so C3 can retry small batches (< 10)
/// or escalate the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessingError {
    pub batch_id: String,
    pub processed: usize,
    pub failed_items: Vec<FailedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: String,
    pub error: String,
}
