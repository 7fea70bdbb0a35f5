//! # kgraph-ingest: high-throughput ingestion & session subsystem
//!
//! The part of a source-repository knowledge graph system that turns a
//! stream of file-change events into consistent graph mutations under
//! load, coordinates multiple concurrent writer agents through durable
//! sessions, and guarantees checkpoint/rollback durability. AST parsing,
//! embedding generation, the graph database itself, the vector store,
//! the relational job store, the pub/sub key-value store, the HTTP/RPC
//! surface, the CLI, the admin UI, auth, and SCM providers are all
//! external collaborators this crate only speaks to through traits
//! ([`graph_adapter::GraphServiceClient`], [`sessions::SessionStorageBackend`],
//! [`checkpoint::JobPersistence`]) — how they're implemented is out of
//! scope.
//!
//! ## Module guide
//!
//! - [`queue`] (C1) — partitioned, priority-ordered task queue with
//!   backpressure and jittered retry scheduling.
//! - [`workers`] (C2) — auto-scaling worker pool executing tasks per
//!   partition with weak per-`partitionKey` ordering.
//! - [`resilience`] (C3) — retry policy, circuit breaker, dead-letter
//!   queue, rate-limited error reporting.
//! - [`batch`] (C4) — idempotent micro-batching plus the fragment
//!   dependency DAG.
//! - [`ingestion`] (C5) — the orchestrator wiring C1–C4 together behind a
//!   `start`/`pause`/`resume`/`stop` lifecycle.
//! - [`graph_adapter`] (C6) — bulk-preferring graph write adapter with
//!   optional cache/buffer, over the abstract [`graph_adapter::GraphServiceClient`].
//! - [`sessions`] (C7–C9) — durable event-ordered session store, the
//!   sequence/checkpoint lifecycle manager layered on it, and the
//!   read-side graph-join bridge.
//! - [`checkpoint`] (C10) — durable, retrying checkpoint job runner.
//! - [`rollback`] (C11) — snapshots, diff engine, pluggable rollback
//!   strategies, and conflict resolution.
//! - [`event_bus`] — the typed publish/subscribe channel set every
//!   component above reports through.
//! - [`config`] — one struct per component's config surface, each
//!   `Default`-constructible and overridable via `dotenvy`.
//! - [`error`] — the crate-wide `IngestError` aggregate and the
//!   `{code, message, retryable, details?}` structured-error contract.
//! - [`telemetry`] — human-readable event/error rendering for terminals.
//! - [`model`] — the pure data model (change events, tasks, fragments,
//!   entities, relationships, sessions, checkpoint jobs, rollback types).
//! - [`utils`] — id generation and backoff helpers shared across
//!   components.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod graph_adapter;
pub mod ingestion;
pub mod model;
pub mod queue;
pub mod resilience;
pub mod rollback;
pub mod sessions;
pub mod telemetry;
pub mod utils;
pub mod workers;

pub use config::IngestConfig;
pub use error::{ErrorKind, IngestError, StructuredError, ToStructuredError};
