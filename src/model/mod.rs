//! Pure domain types (spec §3): no I/O, no async, serde-only so they
//! cross the persistence and graph-service boundaries unmodified.

pub mod change_event;
pub mod checkpoint_job;
pub mod entity;
pub mod fragment;
pub mod ids;
pub mod relationship;
pub mod rollback;
pub mod session;
pub mod task;
pub mod version;

pub use change_event::{ChangeEvent, ChangeEventKind};
pub use checkpoint_job::{CheckpointJob, CheckpointJobPayload, CheckpointJobStatus, CheckpointReason};
pub use entity::{Entity, EntityEnvelope, SymbolKind};
pub use fragment::{ChangeFragment, FragmentChangeType, FragmentOperation};
pub use relationship::{Relationship, RelationshipType};
pub use rollback::{DiffEntry, DiffOperation, RollbackPoint, Snapshot, SnapshotType};
pub use session::{ChangeElementType, ChangeInfo, Session, SessionEvent, SessionState, StateTransition};
pub use task::{Task, TaskType, WorkerResult};
pub use version::Version;
