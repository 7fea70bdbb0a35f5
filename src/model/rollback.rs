use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Named capture of pre-change state used as a rollback target (spec §3,
/// glossary). Owns no snapshots directly — they are separate rows keyed
/// by `rollback_point_id`, reconciled by cleanup sweeps (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackPoint {
    pub id: String,
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub entities: Vec<String>,
    pub relationships: Vec<String>,
    pub metadata: HashMap<String, Value>,
}

impl RollbackPoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            timestamp: now,
            session_id: None,
            expires_at: now + ttl,
            entities: Vec::new(),
            relationships: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Entity,
    Relationship,
    SessionState,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub rollback_point_id: String,
    pub snapshot_type: SnapshotType,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(
        id: impl Into<String>,
        rollback_point_id: impl Into<String>,
        snapshot_type: SnapshotType,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            rollback_point_id: rollback_point_id.into(),
            snapshot_type,
            payload,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiffOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffEntry {
    pub path: String,
    pub operation: DiffOperation,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub metadata: Option<Value>,
}
