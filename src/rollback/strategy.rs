//! Rollback execution strategies (spec §4.11): `full`, `partial`,
//! `time_based` and `dry_run`. Each strategy narrows a diff down to the
//! entries it will act on and whether those entries are actually written.
//!
//! Grounded on `weavegraph::reducers::{Reducer, ReducerRegistry}`: a small
//! trait plus a registry keyed by a closed discriminant enum rather than
//! a string, so an unknown strategy is a compile-time impossibility and
//! an unregistered one is a clear runtime error instead of a silent no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::model::{DiffEntry, SnapshotType};

use super::error::RollbackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategyKind {
    Full,
    Partial,
    TimeBased,
    DryRun,
}

#[derive(Debug, Clone, Default)]
pub struct PartialSelection {
    pub snapshot_type: Option<SnapshotType>,
    pub path_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackContext {
    pub rollback_before: Option<DateTime<Utc>>,
    pub partial_selection: Option<PartialSelection>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackPreview {
    pub entry_count: usize,
    pub affected_paths: Vec<String>,
    pub estimated_duration_ms: u64,
    /// Entries where the value captured in the diff no longer matches
    /// the graph's current live value — filled in by
    /// [`super::manager::RollbackManager::preview`], which re-queries the
    /// graph; always `0` from [`RollbackStrategy::generate_preview`]'s own
    /// default, since a strategy alone has no live connection to check.
    pub predicted_conflicts: usize,
    /// Free-form warnings about the selected entries (e.g. two snapshots
    /// touching the same path) — populated the same way.
    pub dependency_warnings: Vec<String>,
}

pub trait RollbackStrategy: Send + Sync {
    fn kind(&self) -> RollbackStrategyKind;

    /// Narrows a full diff down to the entries this strategy acts on.
    fn select<'a>(&self, diff: &'a [DiffEntry], context: &RollbackContext) -> Vec<&'a DiffEntry>;

    /// Whether selected entries are actually written to the graph.
    /// `false` for `dry_run`, which only ever produces a preview.
    fn writes(&self) -> bool {
        true
    }

    fn validate(&self, context: &RollbackContext) -> Result<(), RollbackError> {
        let _ = context;
        Ok(())
    }

    fn generate_preview(&self, diff: &[DiffEntry], context: &RollbackContext) -> RollbackPreview {
        let selected = self.select(diff, context);
        RollbackPreview {
            entry_count: selected.len(),
            affected_paths: selected.iter().map(|e| e.path.clone()).collect(),
            estimated_duration_ms: (selected.len() as u64) * 25,
        }
    }
}

/// Rolls back every diff entry unconditionally.
pub struct FullRollback;

impl RollbackStrategy for FullRollback {
    fn kind(&self) -> RollbackStrategyKind {
        RollbackStrategyKind::Full
    }

    fn select<'a>(&self, diff: &'a [DiffEntry], _context: &RollbackContext) -> Vec<&'a DiffEntry> {
        diff.iter().collect()
    }
}

/// Rolls back only entries whose path matches one of the caller-supplied
/// prefixes (spec §4.11 — "selective rollback of specific entities").
pub struct PartialRollback;

impl RollbackStrategy for PartialRollback {
    fn kind(&self) -> RollbackStrategyKind {
        RollbackStrategyKind::Partial
    }

    fn select<'a>(&self, diff: &'a [DiffEntry], context: &RollbackContext) -> Vec<&'a DiffEntry> {
        let Some(selection) = &context.partial_selection else {
            return Vec::new();
        };
        if selection.path_prefixes.is_empty() {
            return diff.iter().collect();
        }
        diff.iter()
            .filter(|e| selection.path_prefixes.iter().any(|prefix| e.path.starts_with(prefix.as_str())))
            .collect()
    }

    fn validate(&self, context: &RollbackContext) -> Result<(), RollbackError> {
        if context.partial_selection.is_none() {
            return Err(RollbackError::Snapshot("partial rollback requires a selection".into()));
        }
        Ok(())
    }
}

/// Rolls back to a point-in-time target. The diff handed to strategies is
/// already scoped to the chosen rollback point, so selection is a pass
/// through; `validate` just confirms a target timestamp was supplied.
pub struct TimeBasedRollback;

impl RollbackStrategy for TimeBasedRollback {
    fn kind(&self) -> RollbackStrategyKind {
        RollbackStrategyKind::TimeBased
    }

    fn select<'a>(&self, diff: &'a [DiffEntry], _context: &RollbackContext) -> Vec<&'a DiffEntry> {
        diff.iter().collect()
    }

    fn validate(&self, context: &RollbackContext) -> Result<(), RollbackError> {
        if context.rollback_before.is_none() {
            return Err(RollbackError::Snapshot("time-based rollback requires a target timestamp".into()));
        }
        Ok(())
    }
}

/// Computes the full diff and preview but never writes anything.
pub struct DryRunRollback;

impl RollbackStrategy for DryRunRollback {
    fn kind(&self) -> RollbackStrategyKind {
        RollbackStrategyKind::DryRun
    }

    fn select<'a>(&self, diff: &'a [DiffEntry], _context: &RollbackContext) -> Vec<&'a DiffEntry> {
        diff.iter().collect()
    }

    fn writes(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: FxHashMap<RollbackStrategyKind, Arc<dyn RollbackStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
            .with_strategy(Arc::new(FullRollback))
            .with_strategy(Arc::new(PartialRollback))
            .with_strategy(Arc::new(TimeBasedRollback))
            .with_strategy(Arc::new(DryRunRollback))
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, strategy: Arc<dyn RollbackStrategy>) -> &mut Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RollbackStrategy>) -> Self {
        self.register(strategy);
        self
    }

    pub fn get(&self, kind: RollbackStrategyKind) -> Option<Arc<dyn RollbackStrategy>> {
        self.strategies.get(&kind).cloned()
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
    fn full_strategy_selects_every_entry() {
        let registry = StrategyRegistry::default();
        let strategy = registry.get(RollbackStrategyKind::Full).unwrap();
        let diff = vec![entry("a"), entry("b")];
        assert_eq!(strategy.select(&diff, &RollbackContext::default()).len(), 2);
    }

    #[test]
    fn partial_strategy_filters_by_prefix() {
        let registry = StrategyRegistry::default();
        let strategy = registry.get(RollbackStrategyKind::Partial).unwrap();
        let diff = vec![entry("entity.e1.name"), entry("entity.e2.name")];
        let context = RollbackContext {
            partial_selection: Some(PartialSelection {
                snapshot_type: None,
                path_prefixes: vec!["entity.e1".into()],
            }),
            ..Default::default()
        };
        let selected = strategy.select(&diff, &context);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, "entity.e1.name");
    }

    #[test]
    fn partial_strategy_without_selection_fails_validation() {
        let registry = StrategyRegistry::default();
        let strategy = registry.get(RollbackStrategyKind::Partial).unwrap();
        assert!(strategy.validate(&RollbackContext::default()).is_err());
    }

    #[test]
    fn dry_run_never_writes() {
        let registry = StrategyRegistry::default();
        let strategy = registry.get(RollbackStrategyKind::DryRun).unwrap();
        assert!(!strategy.writes());
    }
}
