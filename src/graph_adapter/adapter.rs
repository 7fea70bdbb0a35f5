//! C6: graph write adapter (spec §4.6). Wraps a [`GraphServiceClient`]
//! with optional per-process caching (suppress re-submits of already
//! written ids) and buffering (flush on size or interval); both are
//! "behavioural, not correctness-critical" per spec, so they default off.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{instrument, warn};

use crate::model::{Entity, Relationship, Version};

use super::traits::{BulkWriteOptions, BulkWriteResult, GraphServiceClient, ItemResult, Result};

#[derive(Debug, Clone, Default)]
pub struct GraphAdapterOptions {
    pub enable_cache: bool,
    pub enable_buffering: bool,
    pub buffer_size: usize,
    pub buffer_interval: Duration,
    pub max_concurrent_writes: usize,
}

/// Bulk-preferring, chunk-falling-back write path to the external graph
/// service (spec §4.6). Buffering accumulates entities until `buffer_size`
/// or `buffer_interval` elapses; call [`GraphWriteAdapter::flush`] to force
/// a drain (e.g. before shutdown).
pub struct GraphWriteAdapter {
    client: Arc<dyn GraphServiceClient>,
    options: GraphAdapterOptions,
    written_ids: DashSet<String>,
    entity_buffer: Mutex<Vec<Entity>>,
}

impl GraphWriteAdapter {
    pub fn new(client: Arc<dyn GraphServiceClient>, options: GraphAdapterOptions) -> Self {
        Self {
            client,
            options,
            written_ids: DashSet::new(),
            entity_buffer: Mutex::new(Vec::new()),
        }
    }

    /// Checks (without marking) which of `entities` haven't already been
    /// written, per [`Self::mark_written`]. An id is only ever marked
    /// once its write actually succeeds, so a failed attempt remains
    /// retriable.
    fn filter_cached(&self, entities: Vec<Entity>) -> Vec<Entity> {
        if !self.options.enable_cache {
            return entities;
        }
        entities.into_iter().filter(|e| !self.written_ids.contains(e.id())).collect()
    }

    /// Records the ids a write actually succeeded for, so later
    /// submissions of the same id are suppressed. Ids that failed stay
    /// out of `written_ids` and remain eligible for retry.
    fn mark_written(&self, result: &BulkWriteResult) {
        if !self.options.enable_cache {
            return;
        }
        for item in &result.results {
            if item.success {
                self.written_ids.insert(item.id.clone());
            }
        }
    }

    /// Emits one [`Version`] row per successfully written id (spec §3
    /// lifecycle invariant — every entity/relationship write is
    /// versioned). Best-effort: a failure to record history doesn't fail
    /// the write itself, mirroring how caching/buffering are
    /// "behavioural, not correctness-critical" in this component.
    async fn emit_versions(&self, result: &BulkWriteResult, change_summary: &str) {
        let versions: Vec<Version> = result
            .results
            .iter()
            .filter(|item| item.success)
            .map(|item| Version::new(item.id.clone(), change_summary))
            .collect();
        if versions.is_empty() {
            return;
        }
        if let Err(err) = self.client.record_versions(&versions).await {
            warn!(%err, change_summary, "graph adapter: failed to record version rows");
        }
    }

    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn create_entities_bulk(&self, entities: Vec<Entity>, opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        let entities = self.filter_cached(entities);
        if entities.is_empty() {
            return Ok(BulkWriteResult::default());
        }
        let result = if self.options.enable_buffering {
            self.buffer_entities(entities, opts).await
        } else {
            self.write_entities(&entities, opts).await
        };
        if let Ok(result) = &result {
            self.mark_written(result);
        }
        result
    }

    async fn buffer_entities(&self, entities: Vec<Entity>, opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        let to_flush = {
            let mut buffer = self.entity_buffer.lock();
            buffer.extend(entities);
            if buffer.len() >= self.options.buffer_size.max(1) {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };
        if to_flush.is_empty() {
            Ok(BulkWriteResult::default())
        } else {
            self.write_entities(&to_flush, opts).await
        }
    }

    /// Force-drain any buffered entities (e.g. on a timer tick or before
    /// pipeline shutdown).
    pub async fn flush(&self) -> Result<BulkWriteResult> {
        let pending = std::mem::take(&mut *self.entity_buffer.lock());
        if pending.is_empty() {
            Ok(BulkWriteResult::default())
        } else {
            self.write_entities(&pending, &BulkWriteOptions::default()).await
        }
    }

    async fn write_entities(&self, entities: &[Entity], opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        let result = if self.client.supports_bulk() {
            self.client.create_entities_bulk(entities, opts).await?
        } else {
            self.chunked_individual_entities(entities).await?
        };
        self.emit_versions(&result, "entity write").await;
        Ok(result)
    }

    async fn chunked_individual_entities(&self, entities: &[Entity]) -> Result<BulkWriteResult> {
        let concurrency = self.options.max_concurrent_writes.max(1);
        let results: Vec<ItemResult> = stream::iter(entities.iter())
            .map(|entity| async move {
                match self.client.create_entity(entity).await {
                    Ok(()) => ItemResult {
                        id: entity.id().to_string(),
                        success: true,
                        error: None,
                    },
                    Err(err) => ItemResult {
                        id: entity.id().to_string(),
                        success: false,
                        error: Some(err.to_string()),
                    },
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        Ok(summarize(results))
    }

    #[instrument(skip(self, relationships), fields(count = relationships.len()))]
    pub async fn create_relationships_bulk(&self, relationships: Vec<Relationship>, opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        let relationships: Vec<Relationship> = if self.options.enable_cache {
            relationships.into_iter().filter(|r| !self.written_ids.contains(&r.id)).collect()
        } else {
            relationships
        };
        if relationships.is_empty() {
            return Ok(BulkWriteResult::default());
        }
        let result = if self.client.supports_bulk() {
            self.client.create_relationships_bulk(&relationships, opts).await
        } else {
            let concurrency = self.options.max_concurrent_writes.max(1);
            let results: Vec<ItemResult> = stream::iter(relationships.iter())
                .map(|rel| async move {
                    match self.client.create_relationship(rel).await {
                        Ok(()) => ItemResult {
                            id: rel.id.clone(),
                            success: true,
                            error: None,
                        },
                        Err(err) => ItemResult {
                            id: rel.id.clone(),
                            success: false,
                            error: Some(err.to_string()),
                        },
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
            Ok(summarize(results))
        };
        if let Ok(result) = &result {
            self.mark_written(result);
            self.emit_versions(result, "relationship write").await;
        }
        result
    }

    pub async fn create_embeddings_batch(&self, entities: Vec<Entity>, opts: &BulkWriteOptions) -> Result<BulkWriteResult> {
        self.client.create_embeddings_batch(&entities, opts).await
    }

    pub fn client(&self) -> &Arc<dyn GraphServiceClient> {
        &self.client
    }
}

fn summarize(results: Vec<ItemResult>) -> BulkWriteResult {
    let failed = results.iter().filter(|r| !r.success).count();
    BulkWriteResult {
        success: failed == 0,
        processed: results.len() - failed,
        failed,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_adapter::memory::InMemoryGraphService;
    use crate::model::entity::EntityEnvelope;
    use crate::model::Entity;

    fn file_entity(id: &str) -> Entity {
        Entity::File(EntityEnvelope::new(id))
    }

    #[tokio::test]
    async fn caching_suppresses_resubmission() {
        let client = Arc::new(InMemoryGraphService::new());
        let adapter = GraphWriteAdapter::new(
            client.clone(),
            GraphAdapterOptions {
                enable_cache: true,
                max_concurrent_writes: 4,
                ..Default::default()
            },
        );
        adapter
            .create_entities_bulk(vec![file_entity("e1")], &BulkWriteOptions::default())
            .await
            .unwrap();
        let result = adapter
            .create_entities_bulk(vec![file_entity("e1")], &BulkWriteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.processed, 0);
        assert_eq!(client.entity_count(), 1);
    }

    #[tokio::test]
    async fn no_bulk_support_falls_back_to_chunked_individual_writes() {
        let client = Arc::new(InMemoryGraphService::new().without_bulk_support());
        let adapter = GraphWriteAdapter::new(
            client.clone(),
            GraphAdapterOptions {
                max_concurrent_writes: 2,
                ..Default::default()
            },
        );
        let result = adapter
            .create_entities_bulk(vec![file_entity("e1"), file_entity("e2")], &BulkWriteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.processed, 2);
        assert_eq!(client.entity_count(), 2);
    }

    #[tokio::test]
    async fn buffering_defers_until_size_reached() {
        let client = Arc::new(InMemoryGraphService::new());
        let adapter = GraphWriteAdapter::new(
            client.clone(),
            GraphAdapterOptions {
                enable_buffering: true,
                buffer_size: 2,
                max_concurrent_writes: 4,
                ..Default::default()
            },
        );
        let r1 = adapter
            .create_entities_bulk(vec![file_entity("e1")], &BulkWriteOptions::default())
            .await
            .unwrap();
        assert_eq!(r1.processed, 0);
        assert_eq!(client.entity_count(), 0);
        let r2 = adapter
            .create_entities_bulk(vec![file_entity("e2")], &BulkWriteOptions::default())
            .await
            .unwrap();
        assert_eq!(r2.processed, 2);
        assert_eq!(client.entity_count(), 2);
    }

    #[tokio::test]
    async fn successful_entity_write_emits_a_version_row() {
        let client = Arc::new(InMemoryGraphService::new());
        let adapter = GraphWriteAdapter::new(client.clone(), GraphAdapterOptions::default());
        adapter
            .create_entities_bulk(vec![file_entity("e1")], &BulkWriteOptions::default())
            .await
            .unwrap();
        let versions = client.versions_for("e1");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].entity_id, "e1");
    }

    #[tokio::test]
    async fn successful_relationship_write_emits_a_version_row() {
        use crate::model::{Relationship, RelationshipType};

        let client = Arc::new(InMemoryGraphService::new());
        let adapter = GraphWriteAdapter::new(client.clone(), GraphAdapterOptions::default());
        let rel = Relationship::new(RelationshipType::DependsOn, "e1", "e2", None);
        let rel_id = rel.id.clone();
        adapter
            .create_relationships_bulk(vec![rel], &BulkWriteOptions::default())
            .await
            .unwrap();
        assert_eq!(client.versions_for(&rel_id).len(), 1);
    }
}
