//! Rollback operation state machine (spec §4.11): `PENDING -> IN_PROGRESS
//! -> COMPLETED | FAILED | CANCELLED`, with a 0..100 progress counter and
//! an append-only log of what happened along the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::DiffEntry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// A single execution of a rollback against a [`crate::model::RollbackPoint`].
/// Exactly one of these may be `InProgress` for a given rollback point at
/// a time (spec §4.11 invariant — enforced by [`super::manager::RollbackManager`],
/// not by this type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOperation {
    pub id: String,
    pub rollback_point_id: String,
    pub strategy: super::strategy::RollbackStrategyKind,
    pub status: RollbackOperationStatus,
    pub progress: u8,
    pub diff: Vec<DiffEntry>,
    pub applied: Vec<DiffEntry>,
    pub log: Vec<OperationLogEntry>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RollbackOperation {
    pub fn new(id: impl Into<String>, rollback_point_id: impl Into<String>, strategy: super::strategy::RollbackStrategyKind, diff: Vec<DiffEntry>) -> Self {
        Self {
            id: id.into(),
            rollback_point_id: rollback_point_id.into(),
            strategy,
            status: RollbackOperationStatus::Pending,
            progress: 0,
            diff,
            applied: Vec::new(),
            log: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.log.push(OperationLogEntry { at: Utc::now(), message: message.into() });
    }

    pub fn start(&mut self) {
        self.status = RollbackOperationStatus::InProgress;
        self.log("rollback started");
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    pub fn record_applied(&mut self, entry: DiffEntry) {
        self.applied.push(entry);
        if !self.diff.is_empty() {
            let pct = (self.applied.len() * 100 / self.diff.len()) as u8;
            self.set_progress(pct);
        }
    }

    pub fn complete(&mut self) {
        self.status = RollbackOperationStatus::Completed;
        self.progress = 100;
        self.finished_at = Some(Utc::now());
        self.log("rollback completed");
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.status = RollbackOperationStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.clone());
        self.log(format!("rollback failed: {error}"));
    }

    pub fn cancel(&mut self) {
        self.status = RollbackOperationStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        self.log("rollback cancelled");
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RollbackOperationStatus::Completed | RollbackOperationStatus::Failed | RollbackOperationStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiffOperation;

    fn entry(path: &str) -> DiffEntry {
        DiffEntry {
            path: path.into(),
            operation: DiffOperation::Update,
            old_value: None,
            new_value: None,
            metadata: None,
        }
    }

    #[test]
    fn progress_tracks_applied_fraction() {
        let mut op = RollbackOperation::new("op1", "rp1", super::super::strategy::RollbackStrategyKind::Full, vec![entry("a"), entry("b")]);
        op.start();
        assert_eq!(op.progress, 0);
        op.record_applied(entry("a"));
        assert_eq!(op.progress, 50);
        op.record_applied(entry("b"));
        assert_eq!(op.progress, 100);
        op.complete();
        assert!(op.is_terminal());
    }

    #[test]
    fn cancel_and_fail_are_terminal() {
        let mut op = RollbackOperation::new("op2", "rp1", super::super::strategy::RollbackStrategyKind::DryRun, vec![]);
        op.start();
        op.cancel();
        assert!(op.is_terminal());
        assert_eq!(op.status, RollbackOperationStatus::Cancelled);

        let mut op2 = RollbackOperation::new("op3", "rp1", super::super::strategy::RollbackStrategyKind::Full, vec![]);
        op2.start();
        op2.fail("boom");
        assert!(op2.is_terminal());
        assert_eq!(op2.error.as_deref(), Some("boom"));
    }
}
