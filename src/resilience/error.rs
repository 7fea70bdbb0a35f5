use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};

#[derive(Debug, Error, Diagnostic)]
pub enum ErrorHandlerError {
    #[error("circuit breaker open for {operation}; retry after {retry_after_ms}ms")]
    #[diagnostic(
        code(kgraph_ingest::resilience::circuit_open),
        help("the protected operation is short-circuiting until reset_timeout elapses")
    )]
    CircuitOpen { operation: String, retry_after_ms: u64 },

    #[error("dead-letter queue for {queue} is full ({size} entries)")]
    #[diagnostic(code(kgraph_ingest::resilience::dlq_full))]
    DeadLetterQueueFull { queue: String, size: usize },

    #[error("no dead-letter entry {0}")]
    #[diagnostic(code(kgraph_ingest::resilience::dlq_missing))]
    DeadLetterEntryNotFound(String),

    #[error("{operation} exhausted {attempts} attempts: {last_error}")]
    #[diagnostic(code(kgraph_ingest::resilience::retries_exhausted))]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

impl ToStructuredError for ErrorHandlerError {
    fn to_structured(&self) -> StructuredError {
        match self {
            ErrorHandlerError::CircuitOpen { retry_after_ms, .. } => {
                StructuredError::new("CIRCUIT_BREAKER_OPEN", self.to_string(), ErrorKind::Transient)
                    .with_retry_after(*retry_after_ms)
            }
            ErrorHandlerError::DeadLetterQueueFull { .. } => {
                StructuredError::new("DLQ_OVERFLOW", self.to_string(), ErrorKind::Capacity)
            }
            ErrorHandlerError::DeadLetterEntryNotFound(_) => {
                StructuredError::new("DLQ_ENTRY_NOT_FOUND", self.to_string(), ErrorKind::Business)
            }
            ErrorHandlerError::RetriesExhausted { .. } => {
                StructuredError::new("RETRIES_EXHAUSTED", self.to_string(), ErrorKind::DurableServiceFailure)
            }
        }
    }
}
