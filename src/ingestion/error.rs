use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ErrorKind, StructuredError, ToStructuredError};
use crate::queue::QueueError;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestionError {
    #[error("pipeline is paused; not accepting new change events")]
    #[diagnostic(code(kgraph_ingest::ingestion::paused))]
    Paused,

    #[error("pipeline is not running (state: {state})")]
    #[diagnostic(code(kgraph_ingest::ingestion::not_running))]
    NotRunning { state: String },

    #[error("timed out after {waited_ms}ms waiting for the queue to drain")]
    #[diagnostic(code(kgraph_ingest::ingestion::drain_timeout))]
    DrainTimeout { waited_ms: u64 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Batch(#[from] crate::batch::BatchError),

    #[error("fragment extraction failed: {0}")]
    #[diagnostic(code(kgraph_ingest::ingestion::extraction_failed))]
    Extraction(String),
}

impl ToStructuredError for IngestionError {
    fn to_structured(&self) -> StructuredError {
        match self {
            IngestionError::Paused => StructuredError::new("PIPELINE_PAUSED", self.to_string(), ErrorKind::Business),
            IngestionError::NotRunning { .. } => {
                StructuredError::new("PIPELINE_NOT_RUNNING", self.to_string(), ErrorKind::Business)
            }
            IngestionError::DrainTimeout { .. } => {
                StructuredError::new("DRAIN_TIMEOUT", self.to_string(), ErrorKind::Transient)
            }
            IngestionError::Queue(inner) => inner.to_structured(),
            IngestionError::Batch(inner) => inner.to_structured(),
            IngestionError::Extraction(_) => {
                StructuredError::new("EXTRACTION_FAILED", self.to_string(), ErrorKind::Programmer)
            }
        }
    }
}
