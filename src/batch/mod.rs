//! C4: batch processor (spec §4.4). Micro-batches typed writes and, for
//! fragment sets sharing an event, orders them via the dependency DAG
//! before handing them to [`crate::graph_adapter`].

mod dag;
mod error;
mod idempotency;
mod processor;

pub use dag::{layer_fragments, Layer};
pub use error::{BatchError, BatchProcessingError, FailedItem};
pub use idempotency::{compute_idempotency_key, IdempotencyTracker};
pub use processor::BatchProcessor;
