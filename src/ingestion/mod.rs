//! C5: the ingestion pipeline (spec §4.5). Accepts change events,
//! assigns priority, drives parsing through the worker pool, and routes
//! resulting fragments to the batch processor — or accepts already-parsed
//! fragments directly.

mod error;
mod extractor;
mod metrics;
mod pipeline;
mod priority;

pub use error::IngestionError;
pub use extractor::{FragmentExtractor, NullFragmentExtractor};
pub use metrics::{LatencySampler, PipelineCounters, PipelineSnapshot, QueueMetricsView};
pub use pipeline::{IngestionPipeline, PipelineState};
pub use priority::compute_priority;
