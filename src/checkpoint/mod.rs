//! C10: durable checkpoint job runner (spec §4.10). Submission is
//! decoupled from execution: [`CheckpointJobRunner::submit`] persists and
//! enqueues a job and returns immediately, while a bounded pool of
//! workers actually talks to the graph service.

mod error;
mod persistence;
mod runner;
#[cfg(feature = "sqlite")]
mod store_sqlite;

pub use error::CheckpointJobError;
pub use persistence::{InMemoryJobPersistence, JobPersistence, JobSnapshot};
pub use runner::{CheckpointJobRunner, CheckpointOutcome};
#[cfg(feature = "sqlite")]
pub use store_sqlite::SqliteJobPersistence;
