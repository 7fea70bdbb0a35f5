//! The external graph service contract (spec §6). Out of scope to
//! implement (spec §1 — "the graph database itself ... is left open");
//! this crate only needs the abstract surface so C6/C9/C10 can be coded
//! against a trait object and tested against [`super::memory::InMemoryGraphService`].
//!
//! Grounded on `weavegraph::runtimes::checkpointer::Checkpointer`: an
//! `async_trait`, `Send + Sync` trait with a matching in-memory
//! implementation living alongside it.

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Entity, Relationship, Version};

use super::error::GraphServiceError;

pub type Result<T> = std::result::Result<T, GraphServiceError>;

/// Per-item outcome of a bulk write (spec §6 — `results[]`).
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BulkWriteResult {
    pub success: bool,
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<ItemResult>,
}

impl BulkWriteResult {
    pub fn all_ok(ids: impl IntoIterator<Item = String>) -> Self {
        let results: Vec<ItemResult> = ids
            .into_iter()
            .map(|id| ItemResult {
                id,
                success: true,
                error: None,
            })
            .collect();
        Self {
            success: true,
            processed: results.len(),
            failed: 0,
            results,
        }
    }

    pub fn merge(mut self, other: BulkWriteResult) -> Self {
        self.processed += other.processed;
        self.failed += other.failed;
        self.success = self.success && other.success;
        self.results.extend(other.results);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BulkWriteOptions {
    pub batch_size: Option<usize>,
    pub skip_embedding: bool,
    pub r#async: bool,
}

#[derive(Debug, Clone)]
pub struct CreateCheckpointOptions {
    pub reason: crate::model::CheckpointReason,
    pub hops: u32,
    pub window: Option<String>,
}

/// The adapter interface to an external, Cypher-like graph database
/// (spec §6). Bulk ops are preferred; callers without a bulk-capable
/// backend fall back to chunked concurrent individual writes (spec §4.6).
#[async_trait]
pub trait GraphServiceClient: Send + Sync {
    async fn create_entities_bulk(&self, entities: &[Entity], opts: &BulkWriteOptions) -> Result<BulkWriteResult>;

    async fn create_relationships_bulk(&self, relationships: &[Relationship], opts: &BulkWriteOptions) -> Result<BulkWriteResult>;

    async fn create_embeddings_batch(&self, entities: &[Entity], opts: &BulkWriteOptions) -> Result<BulkWriteResult>;

    async fn create_entity(&self, entity: &Entity) -> Result<()>;

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Upserts an entity from its opaque JSON snapshot form (spec §4.11's
    /// rollback execute path: the diff engine operates on opaque snapshot
    /// JSON, spec §3 — a rollback target is not necessarily a
    /// fully-typed [`Entity`], so this writes the reconstructed JSON
    /// directly rather than forcing it through the typed model).
    async fn upsert_entity_json(&self, entity_id: &str, value: Value) -> Result<()>;

    /// Removes an entity outright. Used by rollback when a diff's
    /// resolved target state for an id is empty (spec §4.11 — rollback
    /// must be able to apply `delete`, not just `create`/`update`).
    async fn delete_entity(&self, entity_id: &str) -> Result<()>;

    /// Upserts a relationship from its opaque JSON snapshot form; mirrors
    /// [`Self::upsert_entity_json`].
    async fn upsert_relationship_json(&self, relationship_id: &str, value: Value) -> Result<()>;

    /// Removes a relationship outright.
    async fn delete_relationship(&self, relationship_id: &str) -> Result<()>;

    async fn create_checkpoint(&self, seed_entity_ids: &[String], opts: &CreateCheckpointOptions) -> Result<String>;

    async fn annotate_session_relationships_with_checkpoint(&self, session_id: &str, checkpoint_id_or_label: &str) -> Result<()>;

    async fn create_session_checkpoint_link(&self, session_id: &str, checkpoint_id: &str, meta: Value) -> Result<()>;

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<()>;

    async fn query(&self, query_string: &str, params: Value) -> Result<Vec<Value>>;

    /// Appends one durable [`Version`] row per successfully written entity
    /// or relationship id (spec §3 lifecycle: "entities/relationships are
    /// persistent and versioned — every write emits a Version row and
    /// updates `lastModified`"). Default is a no-op so a backend that
    /// tracks versions natively (or doesn't need this crate to) can opt
    /// out; [`super::memory::InMemoryGraphService`] overrides it to keep
    /// history queryable.
    async fn record_versions(&self, _versions: &[Version]) -> Result<()> {
        Ok(())
    }

    /// Whether this backend natively exposes bulk endpoints; if `false`,
    /// [`super::adapter::GraphWriteAdapter`] chunks into bounded-concurrency
    /// individual calls instead of trusting the default bulk methods.
    fn supports_bulk(&self) -> bool {
        true
    }
}
