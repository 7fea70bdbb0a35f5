use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointReason {
    Manual,
    Daily,
    Incident,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointJobPayload {
    pub session_id: String,
    pub seed_entity_ids: Vec<String>,
    pub reason: CheckpointReason,
    pub hop_count: u32,
    pub window: Option<String>,
    pub annotations: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointJobStatus {
    Queued,
    Running,
    Pending,
    Completed,
    ManualIntervention,
}

/// Durable background job materializing a checkpoint from a session
/// (spec §4.10). Every status transition is upserted through
/// [`JobPersistence`](crate::checkpoint::JobPersistence) so the job
/// survives process restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointJob {
    pub id: String,
    pub payload: CheckpointJobPayload,
    pub attempts: u32,
    pub status: CheckpointJobStatus,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl CheckpointJob {
    pub fn new(id: impl Into<String>, payload: CheckpointJobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            payload,
            attempts: 0,
            status: CheckpointJobStatus::Queued,
            queued_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn transition(&mut self, status: CheckpointJobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
