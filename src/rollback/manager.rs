//! C11: the rollback manager (spec §4.11). Owns rollback points and their
//! typed snapshots, drives the diff engine against live graph state,
//! dispatches to a [`super::strategy::RollbackStrategy`] through the
//! registry, resolves conflicts along the way, and runs a periodic sweep
//! that expires old rollback points (invariant §8.7 — deleting a point
//! removes its snapshots too).
//!
//! Grounded on `weavegraph::reducers::{Reducer, ReducerRegistry}` for the
//! strategy-dispatch shape (already applied in `strategy.rs`) and on
//! [`crate::checkpoint::runner::CheckpointJobRunner`] for the
//! `Arc<Self>` + `DashMap` + event-emission conventions used throughout
//! this crate's long-lived components.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::RollbackConfig;
use crate::event_bus::{
    Event, EventEmitter, RollbackCompletedPayload, RollbackCreatedPayload, RollbackFailedPayload,
    RollbackProgressPayload, RollbackStartedPayload,
};
use crate::graph_adapter::{GraphServiceClient, GraphServiceError};
use crate::model::{DiffEntry, RollbackPoint, Snapshot, SnapshotType};
use crate::utils::id_generator::IdGenerator;

use super::conflict::{Conflict, ConflictResolutionMode, ConflictResolver, MergeHeuristics};
use super::diff::diff_payload;
use super::error::RollbackError;
use super::operation::{RollbackOperation, RollbackOperationStatus};
use super::strategy::{RollbackContext, RollbackPreview, RollbackStrategyKind, StrategyRegistry};

fn snapshot_prefix(snapshot_type: SnapshotType) -> &'static str {
    match snapshot_type {
        SnapshotType::Entity => "entity",
        SnapshotType::Relationship => "relationship",
        SnapshotType::SessionState => "session",
        SnapshotType::Filesystem => "fs",
    }
}

/// What a caller hands the manager when capturing a rollback point: one
/// typed payload per snapshot kind it wants captured. A path-by-path
/// payload of `{id -> serialized value}` lets the diff engine operate
/// uniformly over entities, relationships, and opaque session/filesystem
/// state (spec §3 — "snapshot ... payload" is opaque to this crate).
#[derive(Debug, Clone)]
pub struct SnapshotCapture {
    pub snapshot_type: SnapshotType,
    pub payload: Value,
    /// Ids captured in this snapshot, recorded onto the owning
    /// [`RollbackPoint`]'s `entities`/`relationships` lists (spec §3).
    pub ids: Vec<String>,
}

impl SnapshotCapture {
    pub fn entities(payload: Value, ids: Vec<String>) -> Self {
        Self { snapshot_type: SnapshotType::Entity, payload, ids }
    }

    pub fn relationships(payload: Value, ids: Vec<String>) -> Self {
        Self { snapshot_type: SnapshotType::Relationship, payload, ids }
    }

    pub fn session_state(payload: Value) -> Self {
        Self { snapshot_type: SnapshotType::SessionState, payload, ids: Vec::new() }
    }

    pub fn filesystem(payload: Value) -> Self {
        Self { snapshot_type: SnapshotType::Filesystem, payload, ids: Vec::new() }
    }
}

struct CleanupStats {
    removed_points: usize,
    removed_snapshots: usize,
}

/// C11 orchestrator: rollback points + snapshots + diff + strategies +
/// conflict resolution + operation state machine (spec §4.11).
///
/// Concurrency: at most one [`RollbackOperation`] may be `InProgress` per
/// rollback point (spec §5 — attempts to start a second fail with
/// `OPERATION_IN_PROGRESS`); enforced by `active_by_point` below, which is
/// populated and cleared around `execute`'s critical section.
pub struct RollbackManager {
    config: RollbackConfig,
    graph: Arc<dyn GraphServiceClient>,
    emitter: Arc<dyn EventEmitter>,
    ids: IdGenerator,
    strategies: StrategyRegistry,
    conflict_resolver: ConflictResolver,
    points: DashMap<String, RollbackPoint>,
    snapshots: DashMap<String, Vec<Snapshot>>,
    operations: DashMap<String, RollbackOperation>,
    active_by_point: DashMap<String, String>,
}

impl RollbackManager {
    pub fn new(config: RollbackConfig, graph: Arc<dyn GraphServiceClient>, emitter: Arc<dyn EventEmitter>) -> Arc<Self> {
        Self::with_heuristics(config, graph, emitter, MergeHeuristics::default())
    }

    pub fn with_heuristics(
        config: RollbackConfig,
        graph: Arc<dyn GraphServiceClient>,
        emitter: Arc<dyn EventEmitter>,
        heuristics: MergeHeuristics,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            graph,
            emitter,
            ids: IdGenerator::new(),
            strategies: StrategyRegistry::default(),
            conflict_resolver: ConflictResolver::new(heuristics),
            points: DashMap::new(),
            snapshots: DashMap::new(),
            operations: DashMap::new(),
            active_by_point: DashMap::new(),
        })
    }

    /// Captures a new rollback point plus its typed snapshots (spec
    /// §4.11, glossary "rollback point"). `ttl` falls back to
    /// [`RollbackConfig::default_ttl`] when `None`.
    #[instrument(skip(self, captures), fields(name = %name))]
    pub fn create_rollback_point(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        session_id: Option<String>,
        ttl: Option<chrono::Duration>,
        captures: Vec<SnapshotCapture>,
    ) -> RollbackPoint {
        let id = self.ids.generate_uuid();
        let ttl = ttl.unwrap_or_else(|| {
            chrono::Duration::from_std(self.config.default_ttl).unwrap_or(chrono::Duration::days(7))
        });
        let mut point = RollbackPoint::new(id.clone(), name, ttl);
        point.description = description.into();
        point.session_id = session_id;

        let mut snaps = Vec::with_capacity(captures.len());
        for capture in captures {
            match capture.snapshot_type {
                SnapshotType::Entity => point.entities.extend(capture.ids.iter().cloned()),
                SnapshotType::Relationship => point.relationships.extend(capture.ids.iter().cloned()),
                SnapshotType::SessionState | SnapshotType::Filesystem => {}
            }
            let snapshot_id = self.ids.generate_uuid();
            snaps.push(Snapshot::new(snapshot_id, id.clone(), capture.snapshot_type, capture.payload));
        }

        self.evict_oldest_if_over_capacity();
        self.points.insert(id.clone(), point.clone());
        self.snapshots.insert(id.clone(), snaps);

        let _ = self.emitter.emit(Event::RollbackCreated(RollbackCreatedPayload {
            at: Utc::now(),
            rollback_point_id: id,
            name: point.name.clone(),
        }));

        point
    }

    fn evict_oldest_if_over_capacity(&self) {
        if self.points.len() < self.config.max_rollback_points {
            return;
        }
        let Some(oldest_id) = self
            .points
            .iter()
            .min_by_key(|e| e.timestamp)
            .map(|e| e.id.clone())
        else {
            return;
        };
        self.points.remove(&oldest_id);
        self.snapshots.remove(&oldest_id);
    }

    pub fn get_rollback_point(&self, id: &str) -> Option<RollbackPoint> {
        self.points.get(id).map(|e| e.clone())
    }

    pub fn list_rollback_points(&self) -> Vec<RollbackPoint> {
        self.points.iter().map(|e| e.value().clone()).collect()
    }

    pub fn snapshots_for(&self, rollback_point_id: &str) -> Vec<Snapshot> {
        self.snapshots.get(rollback_point_id).map(|e| e.clone()).unwrap_or_default()
    }

    /// Deletes a rollback point and every snapshot captured under it
    /// (invariant §8.7). Refuses while an operation is in progress
    /// against it.
    pub fn delete_rollback_point(&self, id: &str) -> Result<(), RollbackError> {
        if self.active_by_point.contains_key(id) {
            return Err(RollbackError::OperationInProgress(id.to_string()));
        }
        if self.points.remove(id).is_none() {
            return Err(RollbackError::PointNotFound(id.to_string()));
        }
        self.snapshots.remove(id);
        Ok(())
    }

    /// Fetches the live value backing a snapshot: entities and
    /// relationships round-trip through [`GraphServiceClient::query`]
    /// (spec §6's `query(queryString, params)` contract, Cypher-like);
    /// session/filesystem snapshots have no independent graph-side
    /// "live" representation so they diff against themselves (no-op).
    async fn fetch_live(&self, snapshot: &Snapshot) -> Value {
        match snapshot.snapshot_type {
            SnapshotType::Entity | SnapshotType::Relationship => {
                let ids: Vec<&str> = snapshot.payload.as_object().map(|m| m.keys().map(String::as_str).collect()).unwrap_or_default();
                match self.graph.query("MATCH (e) WHERE e.id IN $ids RETURN e", serde_json::json!({ "ids": ids })).await {
                    Ok(rows) => {
                        let mut map = serde_json::Map::new();
                        for row in rows {
                            if let Some(id) = row.get("id").and_then(Value::as_str) {
                                map.insert(id.to_string(), row);
                            }
                        }
                        Value::Object(map)
                    }
                    Err(err) => {
                        warn!(%err, "rollback: live-state query failed, diffing against empty state");
                        Value::Object(serde_json::Map::new())
                    }
                }
            }
            SnapshotType::SessionState | SnapshotType::Filesystem => snapshot.payload.clone(),
        }
    }

    /// Computes the full diff for a rollback point: one flattened,
    /// type-prefixed entry set per snapshot, concatenated (spec §4.11
    /// diff engine).
    #[instrument(skip(self), err)]
    pub async fn generate_diff(&self, rollback_point_id: &str) -> Result<Vec<DiffEntry>, RollbackError> {
        let snaps = self.snapshots.get(rollback_point_id).map(|e| e.clone()).ok_or_else(|| RollbackError::PointNotFound(rollback_point_id.to_string()))?;

        let mut entries = Vec::new();
        for snapshot in &snaps {
            let live = self.fetch_live(snapshot).await;
            let prefix = snapshot_prefix(snapshot.snapshot_type);
            for mut entry in diff_payload(&snapshot.payload, &live) {
                entry.path = format!("{prefix}:{}", entry.path);
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Generates a preview without mutating anything (spec §4.11 dry-run
    /// report: counts, duration estimate, predicted conflicts, affected
    /// items). Usable standalone (independent of [`Self::execute`]) since
    /// any strategy kind can preview, not only `DryRun`.
    #[instrument(skip(self, context), err)]
    pub async fn preview(
        &self,
        rollback_point_id: &str,
        strategy_kind: RollbackStrategyKind,
        context: &RollbackContext,
    ) -> Result<RollbackPreview, RollbackError> {
        let diff = self.generate_diff(rollback_point_id).await?;
        let strategy = self.strategies.get(strategy_kind).ok_or_else(|| RollbackError::Snapshot(format!("no strategy registered for {strategy_kind:?}")))?;
        strategy.validate(context)?;

        let mut preview = strategy.generate_preview(&diff, context);
        let selected = strategy.select(&diff, context);
        preview.predicted_conflicts = selected.iter().filter(|e| matches!(e.operation, crate::model::DiffOperation::Update)).count();
        if selected.len() != selected.iter().map(|e| &e.path).collect::<std::collections::HashSet<_>>().len() {
            preview.dependency_warnings.push("duplicate paths selected across snapshots".to_string());
        }
        Ok(preview)
    }

    /// Executes a rollback with the given strategy and conflict
    /// resolution mode (spec §4.11). Returns the finished
    /// [`RollbackOperation`]; `DryRun` always completes with `applied`
    /// empty and zero graph writes (invariant §8.8).
    #[instrument(skip(self, context), fields(rollback_point_id = %rollback_point_id), err)]
    pub async fn execute(
        &self,
        rollback_point_id: &str,
        strategy_kind: RollbackStrategyKind,
        resolution_mode: ConflictResolutionMode,
        context: &RollbackContext,
    ) -> Result<RollbackOperation, RollbackError> {
        if !self.points.contains_key(rollback_point_id) {
            return Err(RollbackError::PointNotFound(rollback_point_id.to_string()));
        }
        if self.active_by_point.contains_key(rollback_point_id) {
            return Err(RollbackError::OperationInProgress(rollback_point_id.to_string()));
        }

        let strategy = self.strategies.get(strategy_kind).ok_or_else(|| RollbackError::Snapshot(format!("no strategy registered for {strategy_kind:?}")))?;
        strategy.validate(context)?;

        let diff = self.generate_diff(rollback_point_id).await?;
        let operation_id = self.ids.generate_uuid();
        let mut operation = RollbackOperation::new(operation_id.clone(), rollback_point_id, strategy_kind, diff.clone());
        self.active_by_point.insert(rollback_point_id.to_string(), operation_id.clone());
        self.operations.insert(operation_id.clone(), operation.clone());

        operation.start();
        self.operations.insert(operation_id.clone(), operation.clone());
        let _ = self.emitter.emit(Event::RollbackStarted(RollbackStartedPayload {
            at: Utc::now(),
            operation_id: operation_id.clone(),
            rollback_point_id: rollback_point_id.to_string(),
        }));

        let result = self.run_strategy(&mut operation, strategy.as_ref(), context, resolution_mode).await;

        match result {
            Ok(()) => {
                operation.complete();
                let _ = self.emitter.emit(Event::RollbackCompleted(RollbackCompletedPayload {
                    at: Utc::now(),
                    operation_id: operation_id.clone(),
                    applied: operation.applied.len(),
                }));
            }
            Err(err) => {
                operation.fail(err.to_string());
                let _ = self.emitter.emit(Event::RollbackFailed(RollbackFailedPayload {
                    at: Utc::now(),
                    operation_id: operation_id.clone(),
                    error: err.to_string(),
                }));
                self.operations.insert(operation_id.clone(), operation.clone());
                self.active_by_point.remove(rollback_point_id);
                return Err(err);
            }
        }

        self.operations.insert(operation_id.clone(), operation.clone());
        self.active_by_point.remove(rollback_point_id);
        Ok(operation)
    }

    async fn run_strategy(
        &self,
        operation: &mut RollbackOperation,
        strategy: &dyn super::strategy::RollbackStrategy,
        context: &RollbackContext,
        resolution_mode: ConflictResolutionMode,
    ) -> Result<(), RollbackError> {
        let selected: Vec<DiffEntry> = strategy.select(&operation.diff, context).into_iter().cloned().collect();

        if !strategy.writes() {
            // Dry-run: report only, no writes (invariant §8.8).
            operation.log(format!("dry run selected {} entries, applied none", selected.len()));
            return Ok(());
        }

        // Diff entries are per-leaf (spec §4.11 diff engine is path-by-path),
        // but the graph adapter only writes whole entities/relationships
        // (spec §6). Reconstruct each touched id's target object by
        // starting from its live state and applying every resolved leaf
        // value, then write the rebuilt object back once per id. An entry
        // only counts as applied once its id's write actually succeeds —
        // resolving a conflict doesn't mean the result was persisted.
        let mut targets: std::collections::HashMap<(String, String), Value> = std::collections::HashMap::new();
        let mut pending: std::collections::HashMap<(String, String), Vec<DiffEntry>> = std::collections::HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();

        for entry in selected {
            let live = self.fetch_live_value_for_entry(&entry).await;
            let to_apply = if live != entry.old_value {
                let conflict = Conflict::from_diff_entry(&entry, live);
                let resolved = self.conflict_resolver.resolve(&conflict, resolution_mode)?;
                operation.log(format!("conflict at {}: {}", entry.path, resolved.note));
                resolved.apply_value
            } else {
                entry.new_value.clone()
            };

            let mut applied_entry = entry.clone();
            applied_entry.new_value = to_apply.clone();

            match super::diff::split_prefixed_path(&entry.path) {
                Some((prefix, id, leaf)) if matches!(prefix, "entity" | "relationship") => {
                    let key = (prefix.to_string(), id.to_string());
                    if !targets.contains_key(&key) {
                        targets.insert(key.clone(), self.fetch_live_object(id).await);
                        order.push(key.clone());
                    }
                    let target = targets.get_mut(&key).expect("just inserted");
                    match leaf {
                        Some(leaf) => super::diff::set_path(target, leaf, to_apply),
                        None => *target = to_apply.unwrap_or(Value::Null),
                    }
                    pending.entry(key).or_default().push(applied_entry);
                }
                // Session/filesystem snapshots have no graph-side write-back
                // target (spec §6 only covers entities/relationships), so
                // there's nothing left to fail: record them applied now.
                _ => {
                    operation.record_applied(applied_entry);
                    self.emit_progress(operation);
                }
            }
        }

        for (prefix, id) in order {
            let value = targets.remove(&(prefix.clone(), id.clone())).unwrap_or(Value::Null);
            let is_empty = value.is_null() || value.as_object().is_some_and(serde_json::Map::is_empty);
            let outcome = match prefix.as_str() {
                // Already absent is not a failure: the rollback's goal for
                // this id was for it not to exist, and it doesn't.
                "entity" if is_empty => match self.graph.delete_entity(&id).await {
                    Err(GraphServiceError::EntityNotFound(_)) => Ok(()),
                    other => other,
                },
                "entity" => self.graph.upsert_entity_json(&id, value).await,
                "relationship" if is_empty => match self.graph.delete_relationship(&id).await {
                    Err(GraphServiceError::RelationshipNotFound(_)) => Ok(()),
                    other => other,
                },
                "relationship" => self.graph.upsert_relationship_json(&id, value).await,
                _ => Ok(()),
            };
            let entries = pending.remove(&(prefix.clone(), id.clone())).unwrap_or_default();
            match outcome {
                Ok(()) => {
                    for entry in entries {
                        operation.record_applied(entry);
                    }
                    self.emit_progress(operation);
                }
                Err(err) => {
                    operation.log(format!("write failed for {prefix}:{id}: {err}"));
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }

    fn emit_progress(&self, operation: &RollbackOperation) {
        let _ = self.emitter.emit(Event::RollbackProgress(RollbackProgressPayload {
            at: Utc::now(),
            operation_id: operation.id.clone(),
            progress: operation.progress,
        }));
    }

    /// Fetches the full live row for a single id, or an empty object if
    /// the id has no live representation yet (e.g. rolling forward a
    /// `Create`: the id only exists in the snapshot so far).
    async fn fetch_live_object(&self, id: &str) -> Value {
        self.graph
            .query("MATCH (e) WHERE e.id IN $ids RETURN e", serde_json::json!({ "ids": [id] }))
            .await
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }

    /// Re-checks the live value at a single diff-entry path, for
    /// conflict detection at apply time: the diff's own `old_value` is a
    /// point-in-time snapshot from [`Self::generate_diff`], and something
    /// may have changed the graph since (spec §4.11 — "current value ≠
    /// snapshot's 'from' value"). Returns `None` if the id no longer
    /// exists or the path can't be parsed back to an id.
    async fn fetch_live_value_for_entry(&self, entry: &DiffEntry) -> Option<Value> {
        let (_, id, leaf) = super::diff::split_prefixed_path(&entry.path)?;
        let row = self.fetch_live_object(id).await;
        if row.as_object().is_some_and(serde_json::Map::is_empty) {
            return None;
        }
        match leaf {
            Some(leaf) => super::diff::flatten(&row).get(leaf).cloned(),
            None => Some(row),
        }
    }

    pub fn get_operation(&self, id: &str) -> Option<RollbackOperation> {
        self.operations.get(id).map(|e| e.clone())
    }

    /// Legal only while the operation is `InProgress` (spec §5). Since
    /// `execute` runs the selected entries to completion synchronously
    /// today (no cross-await cancellation point exposed yet), this marks
    /// an in-progress record as cancelled for callers racing a cancel
    /// request against `execute`'s return; a genuinely concurrent,
    /// cooperative cancellation point is a natural follow-up once
    /// `execute` is split into resumable steps.
    pub fn cancel_rollback(&self, operation_id: &str) -> Result<(), RollbackError> {
        let mut entry = self.operations.get_mut(operation_id).ok_or_else(|| RollbackError::OperationNotFound(operation_id.to_string()))?;
        if entry.status != RollbackOperationStatus::InProgress {
            return Err(RollbackError::NotCancellable(operation_id.to_string()));
        }
        entry.cancel();
        self.active_by_point.remove(&entry.rollback_point_id);
        Ok(())
    }

    /// Periodic sweep: removes expired rollback points and their
    /// snapshots (spec §9 — "expired rollback points and their snapshots
    /// are removed on a periodic sweep; counters are published").
    #[instrument(skip(self))]
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self.points.iter().filter(|e| e.is_expired(now)).map(|e| e.id.clone()).collect();

        let stats = expired.iter().fold(CleanupStats { removed_points: 0, removed_snapshots: 0 }, |mut acc, id| {
            if self.active_by_point.contains_key(id) {
                return acc;
            }
            self.points.remove(id);
            if let Some((_, snaps)) = self.snapshots.remove(id) {
                acc.removed_snapshots += snaps.len();
            }
            acc.removed_points += 1;
            acc
        });

        if stats.removed_points > 0 {
            info!(removed_points = stats.removed_points, removed_snapshots = stats.removed_snapshots, "rollback cleanup sweep");
            let _ = self.emitter.emit(Event::CleanupCompleted(crate::event_bus::CleanupCompletedPayload {
                at: Utc::now(),
                source: "rollback".to_string(),
                removed: stats.removed_points,
            }));
        }
        stats.removed_points
    }

    /// Spawns the periodic cleanup sweep as a background task running
    /// every `interval` until the returned handle is aborted.
    pub fn spawn_cleanup_loop(self: &Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.cleanup_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, MemorySink};
    use crate::graph_adapter::InMemoryGraphService;
    use serde_json::json;

    fn manager() -> Arc<RollbackManager> {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        RollbackManager::new(RollbackConfig::default(), Arc::new(InMemoryGraphService::new()), bus.get_emitter())
    }

    fn capture(id: &str, value: Value) -> SnapshotCapture {
        SnapshotCapture::entities(json!({ id: value }), vec![id.to_string()])
    }

    #[tokio::test]
    async fn create_rollback_point_records_ids_and_emits_event() {
        let manager = manager();
        let point = manager.create_rollback_point(
            "pre-migration",
            "before schema migration",
            None,
            None,
            vec![capture("e1", json!({"id": "e1", "name": "alice"}))],
        );
        assert_eq!(point.entities, vec!["e1".to_string()]);
        assert_eq!(manager.list_rollback_points().len(), 1);
    }

    #[tokio::test]
    async fn diff_against_empty_graph_is_all_creates() {
        let manager = manager();
        let point = manager.create_rollback_point(
            "rp",
            "",
            None,
            None,
            vec![capture("e1", json!({"id": "e1", "name": "alice"}))],
        );
        let diff = manager.generate_diff(&point.id).await.unwrap();
        assert!(!diff.is_empty());
        assert!(diff.iter().all(|e| e.operation == crate::model::DiffOperation::Create));
    }

    #[tokio::test]
    async fn dry_run_produces_preview_and_zero_writes() {
        let graph = Arc::new(InMemoryGraphService::new());
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let manager = RollbackManager::new(RollbackConfig::default(), graph.clone(), bus.get_emitter());

        let point = manager.create_rollback_point(
            "rp",
            "",
            None,
            None,
            vec![
                capture("e1", json!({"id": "e1", "name": "alice"})),
                capture("e2", json!({"id": "e2", "name": "bob"})),
            ],
        );

        let writes_before = graph.write_count();
        let context = RollbackContext::default();
        let preview = manager.preview(&point.id, RollbackStrategyKind::DryRun, &context).await.unwrap();
        assert!(preview.entry_count > 0);
        assert_eq!(graph.write_count(), writes_before);

        let operation = manager
            .execute(&point.id, RollbackStrategyKind::DryRun, ConflictResolutionMode::Abort, &context)
            .await
            .unwrap();
        assert_eq!(operation.status, RollbackOperationStatus::Completed);
        assert!(operation.applied.is_empty());
        assert_eq!(graph.write_count(), writes_before);
    }

    #[tokio::test]
    async fn full_rollback_marks_entries_applied_and_completes() {
        let manager = manager();
        let point = manager.create_rollback_point(
            "rp",
            "",
            None,
            None,
            vec![capture("e1", json!({"id": "e1", "name": "alice"}))],
        );
        let context = RollbackContext::default();
        let operation = manager
            .execute(&point.id, RollbackStrategyKind::Full, ConflictResolutionMode::Overwrite, &context)
            .await
            .unwrap();
        assert_eq!(operation.status, RollbackOperationStatus::Completed);
        assert!(!operation.applied.is_empty());
    }

    #[tokio::test]
    async fn concurrent_execute_on_same_point_is_rejected() {
        let manager = manager();
        let point = manager.create_rollback_point("rp", "", None, None, vec![capture("e1", json!({"id": "e1"}))]);
        manager.active_by_point.insert(point.id.clone(), "op-in-flight".to_string());

        let context = RollbackContext::default();
        let err = manager
            .execute(&point.id, RollbackStrategyKind::Full, ConflictResolutionMode::Overwrite, &context)
            .await
            .unwrap_err();
        assert!(matches!(err, RollbackError::OperationInProgress(_)));
    }

    #[tokio::test]
    async fn delete_rollback_point_removes_its_snapshots() {
        let manager = manager();
        let point = manager.create_rollback_point("rp", "", None, None, vec![capture("e1", json!({"id": "e1"}))]);
        assert!(!manager.snapshots_for(&point.id).is_empty());
        manager.delete_rollback_point(&point.id).unwrap();
        assert!(manager.get_rollback_point(&point.id).is_none());
        assert!(manager.snapshots_for(&point.id).is_empty());
    }

    #[tokio::test]
    async fn stale_live_value_triggers_conflict_resolution() {
        let graph = Arc::new(InMemoryGraphService::new());
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let manager = RollbackManager::new(RollbackConfig::default(), graph.clone(), bus.get_emitter());

        // The diff claims the live value was "alice" when captured, but
        // the graph has since moved on to "carol" (simulating a write
        // that landed between diff generation and rollback execution).
        let entity = crate::model::Entity::File(crate::model::EntityEnvelope::new("e1"));
        graph.create_entity(&entity).await.unwrap();

        let stale_entry = DiffEntry {
            path: "entity:e1.type".to_string(),
            operation: crate::model::DiffOperation::Update,
            old_value: Some(json!("Directory")),
            new_value: Some(json!("Module")),
            metadata: None,
        };
        let mut operation = RollbackOperation::new("op1", "rp1", RollbackStrategyKind::Full, vec![stale_entry]);
        operation.start();

        let strategy = manager.strategies.get(RollbackStrategyKind::Full).unwrap();
        manager
            .run_strategy(&mut operation, strategy.as_ref(), &RollbackContext::default(), ConflictResolutionMode::Overwrite)
            .await
            .unwrap();

        assert!(operation.log.iter().any(|l| l.message.contains("conflict at entity:e1.type")));
    }

    #[tokio::test]
    async fn cleanup_sweep_removes_expired_points_only() {
        let manager = manager();
        let expired = manager.create_rollback_point("old", "", None, Some(chrono::Duration::milliseconds(-1)), vec![capture("e1", json!({"id": "e1"}))]);
        let fresh = manager.create_rollback_point("fresh", "", None, Some(chrono::Duration::days(1)), vec![capture("e2", json!({"id": "e2"}))]);

        let removed = manager.cleanup_expired();
        assert_eq!(removed, 1);
        assert!(manager.get_rollback_point(&expired.id).is_none());
        assert!(manager.get_rollback_point(&fresh.id).is_some());
    }
}
