use miette::Diagnostic;
use thiserror::Error;

use crate::error::{StructuredError, ToStructuredError};

#[derive(Debug, Error, Diagnostic)]
pub enum QueueError {
    #[error("queue overflow: partition {partition} depth {depth} exceeds threshold {threshold}")]
    #[diagnostic(
        code(kgraph_ingest::queue::overflow),
        help("raise backpressureThreshold or slow the producer; priority <= 2 tasks bypass this")
    )]
    Overflow {
        partition: String,
        depth: usize,
        threshold: usize,
    },

    #[error("no such partition: {0}")]
    #[diagnostic(code(kgraph_ingest::queue::unknown_partition))]
    UnknownPartition(usize),
}

impl ToStructuredError for QueueError {
    fn to_structured(&self) -> StructuredError {
        match self {
            QueueError::Overflow { .. } => {
                StructuredError::new("QUEUE_OVERFLOW", self.to_string(), crate::error::ErrorKind::Capacity)
            }
            QueueError::UnknownPartition(_) => {
                StructuredError::new("QUEUE_UNKNOWN_PARTITION", self.to_string(), crate::error::ErrorKind::Programmer)
            }
        }
    }
}
