use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};

/// Errors from the C7 session store boundary (spec §4.7).
#[derive(Debug, Error, Diagnostic)]
pub enum SessionStoreError {
    #[error("session {0} already exists")]
    #[diagnostic(code(kgraph_ingest::sessions::store::exists))]
    SessionExists(String),

    #[error("session {0} not found")]
    #[diagnostic(code(kgraph_ingest::sessions::store::not_found))]
    NotFound(String),

    #[error("sequence conflict: expected {expected}, got {got}")]
    #[diagnostic(code(kgraph_ingest::sessions::store::sequence_conflict))]
    SequenceConflict { expected: u64, got: u64 },

    #[error("session backend error: {0}")]
    #[diagnostic(code(kgraph_ingest::sessions::store::backend))]
    Backend(String),
}

impl ToStructuredError for SessionStoreError {
    fn to_structured(&self) -> StructuredError {
        match self {
            SessionStoreError::SessionExists(_) => {
                StructuredError::new("SESSION_EXISTS", self.to_string(), ErrorKind::Business)
            }
            SessionStoreError::NotFound(_) => {
                StructuredError::new("SESSION_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            SessionStoreError::SequenceConflict { .. } => {
                StructuredError::new("SESSION_SEQUENCE_CONFLICT", self.to_string(), ErrorKind::Consistency)
            }
            SessionStoreError::Backend(_) => {
                StructuredError::new("SESSION_BACKEND_ERROR", self.to_string(), ErrorKind::DurableServiceFailure)
            }
        }
    }
}

/// Errors from the C8 session manager (spec §4.8).
#[derive(Debug, Error, Diagnostic)]
pub enum SessionManagerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] SessionStoreError),

    #[error("agent {agent_id} is not joined to session {session_id}")]
    #[diagnostic(code(kgraph_ingest::sessions::manager::not_joined))]
    AgentNotJoined { session_id: String, agent_id: String },

    #[error("failed to submit checkpoint job: {0}")]
    #[diagnostic(code(kgraph_ingest::sessions::manager::checkpoint_submission))]
    CheckpointSubmission(String),
}

impl ToStructuredError for SessionManagerError {
    fn to_structured(&self) -> StructuredError {
        match self {
            SessionManagerError::Store(inner) => inner.to_structured(),
            SessionManagerError::AgentNotJoined { .. } => {
                StructuredError::new("SESSION_AGENT_NOT_JOINED", self.to_string(), ErrorKind::Business)
            }
            SessionManagerError::CheckpointSubmission(_) => {
                StructuredError::new("CHECKPOINT_SUBMISSION_FAILED", self.to_string(), ErrorKind::Transient)
            }
        }
    }
}

/// Errors from the C9 session bridge (spec §4.9). Graph-service failures
/// are deliberately *not* represented here for the read paths: those
/// degrade to the session-only subset instead of propagating (spec
/// §4.9's "best-effort"). This enum only covers bridge-local failures.
#[derive(Debug, Error, Diagnostic)]
pub enum SessionBridgeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] SessionStoreError),

    #[error("invalid query options: {0}")]
    #[diagnostic(code(kgraph_ingest::sessions::bridge::invalid_query))]
    InvalidQuery(String),
}

impl ToStructuredError for SessionBridgeError {
    fn to_structured(&self) -> StructuredError {
        match self {
            SessionBridgeError::Store(inner) => inner.to_structured(),
            SessionBridgeError::InvalidQuery(_) => {
                StructuredError::new("SESSION_BRIDGE_INVALID_QUERY", self.to_string(), ErrorKind::Validation)
            }
        }
    }
}
