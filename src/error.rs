//! Crate-wide error aggregation and the user-visible failure contract.
//!
//! Every component defines its own `thiserror` + `miette::Diagnostic` error
//! enum (see `queue::QueueError`, `resilience::ErrorHandlerError`,
//! `batch::BatchError`, `sessions::SessionStoreError`,
//! `checkpoint::CheckpointJobError`, `rollback::RollbackError`, ...).
//! [`IngestError`] exists for callers who want a single type to match on,
//! and [`ToStructuredError`] implements the `{code, message, retryable,
//! details}` contract from spec §7.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::BatchError;
use crate::checkpoint::CheckpointJobError;
use crate::graph_adapter::GraphServiceError;
use crate::queue::QueueError;
use crate::resilience::ErrorHandlerError;
use crate::rollback::RollbackError;
use crate::sessions::{SessionBridgeError, SessionManagerError, SessionStoreError};

/// Aggregated crate error. Individual components normally propagate their
/// own error type; this exists for call sites that bridge several
/// components (e.g. the ingestion pipeline orchestrator).
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ErrorHandler(#[from] ErrorHandlerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphServiceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    SessionStore(#[from] SessionStoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    SessionManager(#[from] SessionManagerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    SessionBridge(#[from] SessionBridgeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CheckpointJob(#[from] CheckpointJobError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rollback(#[from] RollbackError),
}

/// The seven error kinds from spec §7's taxonomy. Not itself an error type
/// — a classification attached to component errors so C1/C2/C3/C10 can
/// decide retry eligibility without matching on every concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Transient,
    DurableServiceFailure,
    Capacity,
    Consistency,
    Programmer,
    Business,
}

impl ErrorKind {
    /// Whether an error of this kind may be retried in place.
    pub fn retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::DurableServiceFailure)
    }
}

/// The structured, wire-shaped error contract from spec §7:
/// `{code, message, retryable, details?}`, with `retryAfter` for
/// rate-limited errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl StructuredError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: kind.retryable(),
            details: None,
            retry_after_ms: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }
}

/// Implemented by every component error so callers at any boundary can
/// convert to the wire-shaped [`StructuredError`] without matching on
/// concrete variants.
pub trait ToStructuredError {
    fn to_structured(&self) -> StructuredError;
}
