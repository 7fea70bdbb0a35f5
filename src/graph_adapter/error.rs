use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};

/// Errors from the external graph service boundary (spec §6). The graph
/// service itself is out of scope (spec §1); this crate only needs to
/// classify its failures for retry/circuit-breaker purposes.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphServiceError {
    #[error("graph service unavailable: {0}")]
    #[diagnostic(code(kgraph_ingest::graph::unavailable))]
    Unavailable(String),

    #[error("graph query failed: {0}")]
    #[diagnostic(code(kgraph_ingest::graph::query_failed))]
    QueryFailed(String),

    #[error("checkpoint {0} not found")]
    #[diagnostic(code(kgraph_ingest::graph::checkpoint_not_found))]
    CheckpointNotFound(String),

    #[error("entity {0} not found")]
    #[diagnostic(code(kgraph_ingest::graph::entity_not_found))]
    EntityNotFound(String),

    #[error("relationship {0} not found")]
    #[diagnostic(code(kgraph_ingest::graph::relationship_not_found))]
    RelationshipNotFound(String),
}

impl ToStructuredError for GraphServiceError {
    fn to_structured(&self) -> StructuredError {
        match self {
            GraphServiceError::Unavailable(_) => {
                StructuredError::new("GRAPH_SERVICE_UNAVAILABLE", self.to_string(), ErrorKind::DurableServiceFailure)
            }
            GraphServiceError::QueryFailed(_) => {
                StructuredError::new("GRAPH_QUERY_FAILED", self.to_string(), ErrorKind::DurableServiceFailure)
            }
            GraphServiceError::CheckpointNotFound(_) => {
                StructuredError::new("CHECKPOINT_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            GraphServiceError::EntityNotFound(_) => {
                StructuredError::new("ENTITY_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            GraphServiceError::RelationshipNotFound(_) => {
                StructuredError::new("RELATIONSHIP_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
        }
    }
}
