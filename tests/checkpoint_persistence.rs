//! Exercises the durable (`sqlite`) [`JobPersistence`] backend against a
//! real on-disk database, the way `weavegraph`'s own sqlite checkpointer
//! tests do: a fresh file under a temp dir, migrations applied on
//! connect, then a round trip through upsert/load/delete.

use kgraph_ingest::checkpoint::{JobPersistence, SqliteJobPersistence};
use kgraph_ingest::model::{CheckpointJob, CheckpointJobPayload, CheckpointJobStatus, CheckpointReason};

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
async fn sqlite_persistence_round_trips_across_a_fresh_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("kgraph_ingest_test.db");
    let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let persistence = SqliteJobPersistence::connect(&database_url).await.unwrap();

    let mut job = CheckpointJob::new("job1", payload());
    persistence.upsert(&job).await.unwrap();

    let pending = persistence.load_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "job1");

    job.transition(CheckpointJobStatus::ManualIntervention);
    persistence.upsert(&job).await.unwrap();
    assert!(persistence.load_pending().await.unwrap().is_empty());
    assert_eq!(persistence.load_dead_letters().await.unwrap().len(), 1);

    persistence.delete("job1").await.unwrap();
    assert!(persistence.load_dead_letters().await.unwrap().is_empty());

    // Reconnecting to the same file proves the migration and the writes
    // actually persisted to disk rather than an in-memory pool.
    drop(persistence);
    let reopened = SqliteJobPersistence::connect(&database_url).await.unwrap();
    assert!(reopened.load_pending().await.unwrap().is_empty());
}
