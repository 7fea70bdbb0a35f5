//! In-memory [`GraphServiceClient`] fake. Used by tests throughout the
//! crate (including the dry-run write-counting scenario, spec §8 S6) and
//! as a degraded-mode default when no real graph service is configured.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::model::{CheckpointReason, Entity, Relationship, Version};
use crate::utils::id_generator::IdGenerator;

use super::error::GraphServiceError;
use super::traits::{BulkWriteOptions, BulkWriteResult, CreateCheckpointOptions, GraphServiceClient, ItemResult, Result};

pub struct InMemoryGraphService {
    entities: DashMap<String, Entity>,
    relationships: DashMap<String, Relationship>,
    /// Rollback writes back opaque JSON, not necessarily a fully-typed
    /// [`Entity`]/[`Relationship`] (spec §3 — snapshot payloads are
    /// opaque). Kept separate from the typed maps above so a raw write
    /// never has to pass through strict schema validation.
    raw_entities: DashMap<String, Value>,
    raw_relationships: DashMap<String, Value>,
    checkpoints: DashMap<String, Vec<String>>,
    session_checkpoint_links: DashMap<String, Vec<(String, Value)>>,
    versions: DashMap<String, Vec<Version>>,
    ids: IdGenerator,
    write_count: AtomicUsize,
    supports_bulk: bool,
}

impl Default for InMemoryGraphService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphService {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            relationships: DashMap::new(),
            raw_entities: DashMap::new(),
            raw_relationships: DashMap::new(),
            checkpoints: DashMap::new(),
            session_checkpoint_links: DashMap::new(),
            versions: DashMap::new(),
            ids: IdGenerator::new(),
            write_count: AtomicUsize::new(0),
            supports_bulk: true,
        }
    }

    #[must_use]
    pub fn without_bulk_support(mut self) -> Self {
        self.supports_bulk = false;
        self
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len() + self.raw_entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len() + self.raw_relationships.len()
    }

    pub fn has_checkpoint(&self, id: &str) -> bool {
        self.checkpoints.contains_key(id)
    }

    /// Total write calls observed (entity/relationship/checkpoint
    /// mutations) — used by dry-run tests to assert zero writes occurred.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Version rows recorded for `entity_id`, oldest first.
    pub fn versions_for(&self, entity_id: &str) -> Vec<Version> {
        self.versions.get(entity_id).map(|e| e.clone()).unwrap_or_default()
    }

    pub fn version_count(&self) -> usize {
        self.versions.iter().map(|e| e.value().len()).sum()
    }
}

#[async_trait]
impl GraphServiceClient for InMemoryGraphService {
    async fn create_entities_bulk(&self, entities: &[Entity], _opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        for entity in entities {
            self.entities.insert(entity.id().to_string(), entity.clone());
            self.write_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(BulkWriteResult::all_ok(entities.iter().map(|e| e.id().to_string())))
    }

    async fn create_relationships_bulk(&self, relationships: &[Relationship], _opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        for rel in relationships {
            self.relationships.insert(rel.id.clone(), rel.clone());
            self.write_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(BulkWriteResult::all_ok(relationships.iter().map(|r| r.id.clone())))
    }

    async fn create_embeddings_batch(&self, entities: &[Entity], _opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        self.write_count.fetch_add(entities.len(), Ordering::Relaxed);
        Ok(BulkWriteResult::all_ok(entities.iter().map(|e| e.id().to_string())))
    }

    async fn create_entity(&self, entity: &Entity) -> Result<()> {
        self.entities.insert(entity.id().to_string(), entity.clone());
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.relationships.insert(relationship.id.clone(), relationship.clone());
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn upsert_entity_json(&self, entity_id: &str, value: Value) -> Result<()> {
        // A raw write supersedes any typed copy under the same id, so a
        // later read isn't silently shadowed by stale typed state.
        self.entities.remove(entity_id);
        self.raw_entities.insert(entity_id.to_string(), value);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<()> {
        let had_typed = self.entities.remove(entity_id).is_some();
        let had_raw = self.raw_entities.remove(entity_id).is_some();
        if !had_typed && !had_raw {
            return Err(GraphServiceError::EntityNotFound(entity_id.to_string()));
        }
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn upsert_relationship_json(&self, relationship_id: &str, value: Value) -> Result<()> {
        self.relationships.remove(relationship_id);
        self.raw_relationships.insert(relationship_id.to_string(), value);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_relationship(&self, relationship_id: &str) -> Result<()> {
        let had_typed = self.relationships.remove(relationship_id).is_some();
        let had_raw = self.raw_relationships.remove(relationship_id).is_some();
        if !had_typed && !had_raw {
            return Err(GraphServiceError::RelationshipNotFound(relationship_id.to_string()));
        }
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn create_checkpoint(&self, seed_entity_ids: &[String], opts: &CreateCheckpointOptions) -> Result<String> {
        let reason = match opts.reason {
            CheckpointReason::Manual => "manual",
            CheckpointReason::Daily => "daily",
            CheckpointReason::Incident => "incident",
        };
        let checkpoint_id = format!("ckpt_{}_{}", reason, self.ids.next_seq());
        self.checkpoints.insert(checkpoint_id.clone(), seed_entity_ids.to_vec());
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(checkpoint_id)
    }

    async fn annotate_session_relationships_with_checkpoint(&self, _session_id: &str, _checkpoint_id_or_label: &str) -> Result<()> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn create_session_checkpoint_link(&self, session_id: &str, checkpoint_id: &str, meta: Value) -> Result<()> {
        self.session_checkpoint_links
            .entry(session_id.to_string())
            .or_default()
            .push((checkpoint_id.to_string(), meta));
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<()> {
        if self.checkpoints.remove(checkpoint_id).is_none() {
            return Err(GraphServiceError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn record_versions(&self, versions: &[Version]) -> Result<()> {
        for version in versions {
            self.versions.entry(version.entity_id.clone()).or_default().push(version.clone());
        }
        Ok(())
    }

    async fn query(&self, _query_string: &str, params: Value) -> Result<Vec<Value>> {
        // Rollback's live-state lookup (`MATCH (e) WHERE e.id IN $ids RETURN e`):
        // fetch by id across both entities and relationships, each row the
        // matching node/edge's current serialized form (rollback snapshots
        // can hold either kind, spec §3).
        if let Some(ids) = params.get("ids").and_then(Value::as_array) {
            let rows: Vec<Value> = ids
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|id| {
                    if let Some(entity) = self.entities.get(id) {
                        serde_json::to_value(entity.value()).ok()
                    } else if let Some(raw) = self.raw_entities.get(id) {
                        Some(raw.value().clone())
                    } else if let Some(rel) = self.relationships.get(id) {
                        serde_json::to_value(rel.value()).ok()
                    } else {
                        self.raw_relationships.get(id).map(|raw| raw.value().clone())
                    }
                })
                .collect();
            return Ok(rows);
        }

        let entity_id = params.get("entity_id").and_then(Value::as_str);
        let rows: Vec<Value> = self
            .relationships
            .iter()
            .filter(|entry| {
                entity_id.is_none_or(|id| entry.from_entity_id == id || entry.to_entity_id == id)
            })
            .map(|entry| {
                serde_json::json!({
                    "id": entry.id,
                    "type": entry.rel_type.as_str(),
                    "from": entry.from_entity_id,
                    "to": entry.to_entity_id,
                })
            })
            .collect();
        Ok(rows)
    }

    fn supports_bulk(&self) -> bool {
        self.supports_bulk
    }
}
