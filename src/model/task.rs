use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit of work flowing through C1 → C2. `priority` 0 is highest; spec §4.1
/// reserves `0..=2` as the band that bypasses backpressure rejection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub payload: Value,
    pub priority: u8,
    pub partition_key: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    Parse,
    EntityUpsert,
    RelationshipUpsert,
    Embedding,
    Enrich,
}

impl Task {
    pub fn new(id: impl Into<String>, task_type: TaskType, payload: Value, priority: u8) -> Self {
        Self {
            id: id.into(),
            task_type,
            payload,
            priority: priority.min(9),
            partition_key: None,
            retry_count: 0,
            max_retries: 3,
            enqueued_at: Utc::now(),
            not_before: None,
        }
    }

    #[must_use]
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|nb| nb <= now)
    }

    pub fn exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Outcome of a worker executing one [`Task`] (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl WorkerResult {
    pub fn ok(value: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            duration_ms,
        }
    }

    pub fn err(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}
