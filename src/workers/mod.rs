//! Worker pool: parallel task executors with health checks and
//! auto-scaling (spec §4.2, component C2).

mod error;
mod handler;
mod pool;

pub use error::WorkerPoolError;
pub use handler::{FailureSink, NullFailureSink, WorkerHandler};
pub use pool::WorkerPool;
