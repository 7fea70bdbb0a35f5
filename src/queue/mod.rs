//! Partitioned task queue manager (spec §4.1, component C1).

mod error;
mod manager;
mod metrics;
mod partition;

pub use error::QueueError;
pub use manager::TaskQueueManager;
pub use metrics::{QueueCounters, QueueMetrics};
pub use partition::Partition;
