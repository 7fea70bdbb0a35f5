//! Durable persistence for checkpoint jobs (spec §4.10, §6). Serde
//! models are kept separate from the I/O backend, mirroring how the
//! source repo's `runtimes::persistence` holds `PersistedState` apart
//! from `runtimes::checkpointer_sqlite`'s connection handling.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::CheckpointJob;

use super::error::CheckpointJobError;

/// Wire shape for a checkpoint job row (spec §6's abstract
/// `job(id, payload, attempts, status, last_error, queued_at, updated_at)`
/// schema). [`CheckpointJob`] is the in-memory domain type; this is what
/// actually round-trips through a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub status: String,
    pub last_error: Option<String>,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&CheckpointJob> for JobSnapshot {
    fn from(job: &CheckpointJob) -> Self {
        Self {
            id: job.id.clone(),
            payload: serde_json::to_value(&job.payload).unwrap_or(serde_json::Value::Null),
            attempts: job.attempts,
            status: status_label(job.status).to_string(),
            last_error: job.last_error.clone(),
            queued_at: job.queued_at,
            updated_at: job.updated_at,
        }
    }
}

fn status_label(status: crate::model::CheckpointJobStatus) -> &'static str {
    use crate::model::CheckpointJobStatus::*;
    match status {
        Queued => "queued",
        Running => "running",
        Pending => "pending",
        Completed => "completed",
        ManualIntervention => "manual_intervention",
    }
}

impl TryFrom<JobSnapshot> for CheckpointJob {
    type Error = CheckpointJobError;

    fn try_from(row: JobSnapshot) -> Result<Self, Self::Error> {
        use crate::model::CheckpointJobStatus::*;
        let payload = serde_json::from_value(row.payload).map_err(|e| CheckpointJobError::Persistence(e.to_string()))?;
        let status = match row.status.as_str() {
            "queued" => Queued,
            "running" => Running,
            "pending" => Pending,
            "completed" => Completed,
            "manual_intervention" => ManualIntervention,
            other => return Err(CheckpointJobError::Persistence(format!("unknown job status {other}"))),
        };
        Ok(CheckpointJob {
            id: row.id,
            payload,
            attempts: row.attempts,
            status,
            queued_at: row.queued_at,
            updated_at: row.updated_at,
            last_error: row.last_error,
        })
    }
}

/// Injected persistence boundary for C10 (spec §4.10/§6):
/// `initialize/upsert/delete/loadPending/loadDeadLetters`.
#[async_trait]
pub trait JobPersistence: Send + Sync {
    async fn initialize(&self) -> Result<(), CheckpointJobError>;
    async fn upsert(&self, job: &CheckpointJob) -> Result<(), CheckpointJobError>;
    async fn delete(&self, id: &str) -> Result<(), CheckpointJobError>;
    async fn load_pending(&self) -> Result<Vec<CheckpointJob>, CheckpointJobError>;
    async fn load_dead_letters(&self) -> Result<Vec<CheckpointJob>, CheckpointJobError>;
}

/// In-process fake, used by tests and as a default when durability
/// across restarts is not required.
#[derive(Debug, Default)]
pub struct InMemoryJobPersistence {
    rows: DashMap<String, JobSnapshot>,
}

impl InMemoryJobPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl JobPersistence for InMemoryJobPersistence {
    async fn initialize(&self) -> Result<(), CheckpointJobError> {
        Ok(())
    }

    async fn upsert(&self, job: &CheckpointJob) -> Result<(), CheckpointJobError> {
        self.rows.insert(job.id.clone(), JobSnapshot::from(job));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CheckpointJobError> {
        self.rows.remove(id);
        Ok(())
    }

    async fn load_pending(&self) -> Result<Vec<CheckpointJob>, CheckpointJobError> {
        self.rows
            .iter()
            .filter(|e| matches!(e.status.as_str(), "queued" | "running" | "pending"))
            .map(|e| CheckpointJob::try_from(e.value().clone()))
            .collect()
    }

    async fn load_dead_letters(&self) -> Result<Vec<CheckpointJob>, CheckpointJobError> {
        self.rows
            .iter()
            .filter(|e| e.status == "manual_intervention")
            .map(|e| CheckpointJob::try_from(e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CheckpointJobPayload, CheckpointReason};

    fn payload() -> CheckpointJobPayload {
        CheckpointJobPayload {
            session_id: "s1".into(),
            seed_entity_ids: vec!["e1".into()],
            reason: CheckpointReason::Manual,
            hop_count: 2,
            window: None,
            annotations: None,
        }
    }

    #[tokio::test]
    async fn round_trips_pending_and_dead_letter_jobs() {
        let persistence = InMemoryJobPersistence::new();
        let mut job = CheckpointJob::new("job1", payload());
        persistence.upsert(&job).await.unwrap();
        assert_eq!(persistence.load_pending().await.unwrap().len(), 1);

        job.transition(crate::model::CheckpointJobStatus::ManualIntervention);
        persistence.upsert(&job).await.unwrap();
        assert!(persistence.load_pending().await.unwrap().is_empty());
        assert_eq!(persistence.load_dead_letters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let persistence = InMemoryJobPersistence::new();
        let job = CheckpointJob::new("job1", payload());
        persistence.upsert(&job).await.unwrap();
        persistence.delete("job1").await.unwrap();
        assert_eq!(persistence.row_count(), 0);
    }
}
