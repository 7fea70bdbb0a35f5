//! C11: rollback manager (spec §4.11). Snapshots + diff engine +
//! pluggable strategies (`full`/`partial`/`time_based`/`dry_run`) +
//! conflict resolution, orchestrated by [`RollbackManager`].

mod conflict;
mod diff;
mod error;
mod manager;
mod operation;
mod strategy;

pub use conflict::{Conflict, ConflictResolutionMode, ConflictResolver, MergeHeuristics, MergeOutcome, ResolvedConflict};
pub use diff::{diff_payload, flatten};
pub use error::RollbackError;
pub use manager::{RollbackManager, SnapshotCapture};
pub use operation::{OperationLogEntry, RollbackOperation, RollbackOperationStatus};
pub use strategy::{
    DryRunRollback, FullRollback, PartialRollback, PartialSelection, RollbackContext,
    RollbackPreview, RollbackStrategy, RollbackStrategyKind, StrategyRegistry, TimeBasedRollback,
};
