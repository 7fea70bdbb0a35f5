//! Conflict detection and resolution for rollback execution (spec §4.11).
//!
//! A conflict arises when the diff entry being applied disagrees with the
//! value actually live in the graph at execution time (something changed
//! after the snapshot was taken but before the rollback ran). Resolution
//! mode is chosen by the caller per rollback; `Merge` additionally takes
//! a set of heuristics controlling how aggressively it reconciles values.

use serde_json::Value;

use crate::model::{DiffEntry, DiffOperation};

use super::error::RollbackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolutionMode {
    Abort,
    Skip,
    Overwrite,
    Merge,
    Manual,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub path: String,
    pub operation: DiffOperation,
    pub current_value: Option<Value>,
    pub rollback_value: Option<Value>,
}

impl Conflict {
    /// Builds a conflict from a diff entry plus the value actually found
    /// live in the graph at execution time (`None` if the path is gone).
    pub fn from_diff_entry(entry: &DiffEntry, live_value: Option<Value>) -> Self {
        Self {
            path: entry.path.clone(),
            operation: entry.operation,
            current_value: live_value,
            rollback_value: entry.new_value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MergeHeuristics {
    pub prefer_newer: bool,
    pub preserve_structure: bool,
    pub allow_partial_merge: bool,
    pub semantic_analysis: bool,
}

impl Default for MergeHeuristics {
    fn default() -> Self {
        Self {
            prefer_newer: true,
            preserve_structure: true,
            allow_partial_merge: true,
            semantic_analysis: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub success: bool,
    pub merged_value: Option<Value>,
    pub confidence: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConflict {
    pub apply_value: Option<Value>,
    pub note: String,
}

pub struct ConflictResolver {
    heuristics: MergeHeuristics,
}

impl ConflictResolver {
    pub fn new(heuristics: MergeHeuristics) -> Self {
        Self { heuristics }
    }

    pub fn resolve(&self, conflict: &Conflict, mode: ConflictResolutionMode) -> Result<ResolvedConflict, RollbackError> {
        match mode {
            ConflictResolutionMode::Abort => Err(RollbackError::UnresolvedConflict {
                path: conflict.path.clone(),
                reason: "resolution mode is abort".into(),
            }),
            ConflictResolutionMode::Skip => Ok(ResolvedConflict {
                apply_value: conflict.current_value.clone(),
                note: "skipped, current value retained".into(),
            }),
            ConflictResolutionMode::Overwrite => Ok(ResolvedConflict {
                apply_value: conflict.rollback_value.clone(),
                note: "overwritten with rollback value".into(),
            }),
            ConflictResolutionMode::Manual => Err(RollbackError::UnresolvedConflict {
                path: conflict.path.clone(),
                reason: "requires manual resolution".into(),
            }),
            ConflictResolutionMode::Merge => {
                let outcome = self.merge(conflict);
                if outcome.success && (outcome.confidence >= 0.6 || self.heuristics.allow_partial_merge) {
                    Ok(ResolvedConflict {
                        apply_value: outcome.merged_value,
                        note: format!("merged, confidence {:.2}", outcome.confidence),
                    })
                } else {
                    Err(RollbackError::UnresolvedConflict {
                        path: conflict.path.clone(),
                        reason: "merge confidence too low and partial merge disallowed".into(),
                    })
                }
            }
        }
    }

    fn merge(&self, conflict: &Conflict) -> MergeOutcome {
        let mut warnings = Vec::new();
        match (&conflict.current_value, &conflict.rollback_value) {
            (Some(Value::Object(current)), Some(Value::Object(rollback))) if self.heuristics.preserve_structure => {
                let mut merged = current.clone();
                for (key, value) in rollback {
                    merged.insert(key.clone(), value.clone());
                }
                MergeOutcome {
                    success: true,
                    merged_value: Some(Value::Object(merged)),
                    confidence: 0.9,
                    warnings,
                }
            }
            (Some(current), Some(rollback)) => {
                warnings.push(format!("non-object value at {}, falling back to scalar preference", conflict.path));
                let confidence = if self.heuristics.semantic_analysis { 0.6 } else { 0.5 };
                let preferred = if self.heuristics.prefer_newer { rollback.clone() } else { current.clone() };
                MergeOutcome {
                    success: true,
                    merged_value: Some(preferred),
                    confidence,
                    warnings,
                }
            }
            (None, rollback) => MergeOutcome {
                success: true,
                merged_value: rollback.clone(),
                confidence: 0.7,
                warnings,
            },
            (current, None) => MergeOutcome {
                success: true,
                merged_value: current.clone(),
                confidence: 0.7,
                warnings,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_conflict() -> Conflict {
        Conflict {
            path: "entity.attrs".into(),
            operation: DiffOperation::Update,
            current_value: Some(json!({"a": 1, "b": 2})),
            rollback_value: Some(json!({"b": 99, "c": 3})),
        }
    }

    #[test]
    fn abort_rejects_with_unresolved_conflict() {
        let resolver = ConflictResolver::new(MergeHeuristics::default());
        let err = resolver.resolve(&object_conflict(), ConflictResolutionMode::Abort).unwrap_err();
        assert!(matches!(err, RollbackError::UnresolvedConflict { .. }));
    }

    #[test]
    fn overwrite_takes_rollback_value() {
        let resolver = ConflictResolver::new(MergeHeuristics::default());
        let resolved = resolver.resolve(&object_conflict(), ConflictResolutionMode::Overwrite).unwrap();
        assert_eq!(resolved.apply_value, Some(json!({"b": 99, "c": 3})));
    }

    #[test]
    fn merge_combines_object_fields_with_high_confidence() {
        let resolver = ConflictResolver::new(MergeHeuristics::default());
        let resolved = resolver.resolve(&object_conflict(), ConflictResolutionMode::Merge).unwrap();
        let merged = resolved.apply_value.unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 99, "c": 3}));
    }

    #[test]
    fn merge_on_scalar_conflict_without_partial_merge_fails_below_threshold() {
        let mut heuristics = MergeHeuristics::default();
        heuristics.allow_partial_merge = false;
        heuristics.preserve_structure = true;
        let resolver = ConflictResolver::new(heuristics);
        let conflict = Conflict {
            path: "entity.status".into(),
            operation: DiffOperation::Update,
            current_value: Some(json!("active")),
            rollback_value: Some(json!("archived")),
        };
        let err = resolver.resolve(&conflict, ConflictResolutionMode::Merge).unwrap_err();
        assert!(matches!(err, RollbackError::UnresolvedConflict { .. }));
    }
}
