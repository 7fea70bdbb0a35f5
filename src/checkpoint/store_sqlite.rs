//! `sqlite`-gated [`JobPersistence`] backed by `sqlx`, grounded directly
//! on `runtimes::checkpointer_sqlite::SQLiteCheckpointer`: a connect
//! function that optionally runs embedded migrations, and `#[instrument]`
//! annotated methods that open a transaction around each write.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::model::CheckpointJob;

use super::error::CheckpointJobError;
use super::persistence::JobPersistence;

pub struct SqliteJobPersistence {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteJobPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteJobPersistence").finish()
    }
}

impl SqliteJobPersistence {
    /// Connect (or create) the SQLite database at `database_url`, e.g.
    /// `"sqlite://kgraph_ingest.db"`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointJobError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CheckpointJobError::Persistence(format!("connect error: {e}")))?;
        #[cfg(feature = "sqlite-migrations")]
        {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| CheckpointJobError::Persistence(format!("migration failure: {e}")))?;
        }
        Ok(Self { pool: Arc::new(pool) })
    }
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<CheckpointJob, CheckpointJobError> {
    use super::persistence::JobSnapshot;

    let payload_json: String = row.try_get("payload").map_err(|e| CheckpointJobError::Persistence(e.to_string()))?;
    let payload = serde_json::from_str(&payload_json).map_err(|e| CheckpointJobError::Persistence(e.to_string()))?;
    let queued_at_str: String = row.try_get("queued_at").map_err(|e| CheckpointJobError::Persistence(e.to_string()))?;
    let updated_at_str: String = row.try_get("updated_at").map_err(|e| CheckpointJobError::Persistence(e.to_string()))?;
    let snapshot = JobSnapshot {
        id: row.try_get("id").map_err(|e| CheckpointJobError::Persistence(e.to_string()))?,
        payload,
        attempts: row.try_get::<i64, _>("attempts").map_err(|e| CheckpointJobError::Persistence(e.to_string()))? as u32,
        status: row.try_get("status").map_err(|e| CheckpointJobError::Persistence(e.to_string()))?,
        last_error: row.try_get("last_error").map_err(|e| CheckpointJobError::Persistence(e.to_string()))?,
        queued_at: chrono::DateTime::parse_from_rfc3339(&queued_at_str)
            .map_err(|e| CheckpointJobError::Persistence(e.to_string()))?
            .with_timezone(&chrono::Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|e| CheckpointJobError::Persistence(e.to_string()))?
            .with_timezone(&chrono::Utc),
    };
    CheckpointJob::try_from(snapshot)
}

#[async_trait]
impl JobPersistence for SqliteJobPersistence {
    #[instrument(skip(self), err)]
    async fn initialize(&self) -> Result<(), CheckpointJobError> {
        Ok(())
    }

    #[instrument(skip(self, job), err)]
    async fn upsert(&self, job: &CheckpointJob) -> Result<(), CheckpointJobError> {
        let payload_json = serde_json::to_string(&job.payload).map_err(|e| CheckpointJobError::Persistence(e.to_string()))?;
        let status = match job.status {
            crate::model::CheckpointJobStatus::Queued => "queued",
            crate::model::CheckpointJobStatus::Running => "running",
            crate::model::CheckpointJobStatus::Pending => "pending",
            crate::model::CheckpointJobStatus::Completed => "completed",
            crate::model::CheckpointJobStatus::ManualIntervention => "manual_intervention",
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointJobError::Persistence(format!("tx begin: {e}")))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO job (id, payload, attempts, status, last_error, queued_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&job.id)
        .bind(&payload_json)
        .bind(job.attempts as i64)
        .bind(status)
        .bind(&job.last_error)
        .bind(job.queued_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointJobError::Persistence(format!("insert job: {e}")))?;

        tx.commit().await.map_err(|e| CheckpointJobError::Persistence(format!("tx commit: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, id: &str) -> Result<(), CheckpointJobError> {
        sqlx::query("DELETE FROM job WHERE id = ?1")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| CheckpointJobError::Persistence(format!("delete job: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_pending(&self) -> Result<Vec<CheckpointJob>, CheckpointJobError> {
        let rows = sqlx::query("SELECT * FROM job WHERE status IN ('queued', 'running', 'pending')")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| CheckpointJobError::Persistence(format!("select pending: {e}")))?;
        rows.into_iter().map(row_to_job).collect()
    }

    #[instrument(skip(self), err)]
    async fn load_dead_letters(&self) -> Result<Vec<CheckpointJob>, CheckpointJobError> {
        let rows = sqlx::query("SELECT * FROM job WHERE status = 'manual_intervention'")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| CheckpointJobError::Persistence(format!("select dead letters: {e}")))?;
        rows.into_iter().map(row_to_job).collect()
    }
}
