//! C4: batch processor (spec §4.4). Accepts typed batches and fragment
//! sets, applies idempotency and DAG ordering, and writes through C6.
//!
//! Grounded on `weavegraph::reducers`'s registry-keyed-by-discriminant
//! pattern (here keyed by [`FragmentChangeType`] instead of a reducer
//! name) plus `petgraph` for the DAG (see [`super::dag`]).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::instrument;

use crate::config::BatchConfig;
use crate::event_bus::{BatchCompletedPayload, BatchCreatedPayload, Event, EventEmitter};
use crate::graph_adapter::{BulkWriteOptions, BulkWriteResult, GraphWriteAdapter};
use crate::model::{ChangeFragment, Entity, FragmentChangeType, Relationship};
use crate::utils::id_generator::IdGenerator;

use super::dag::layer_fragments;
use super::error::BatchError;
use super::idempotency::{compute_idempotency_key, IdempotencyTracker};

pub struct BatchProcessor {
    config: BatchConfig,
    adapter: Arc<GraphWriteAdapter>,
    idempotency: IdempotencyTracker,
    ids: IdGenerator,
    emitter: Arc<dyn EventEmitter>,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig, adapter: Arc<GraphWriteAdapter>, emitter: Arc<dyn EventEmitter>) -> Self {
        let idempotency = IdempotencyTracker::new(config.streaming.idempotency_key_ttl);
        Self {
            config,
            adapter,
            idempotency,
            ids: IdGenerator::new(),
            emitter,
        }
    }

    /// Micro-batch a set of entities, chunked to `entity_batch_size`, with
    /// idempotency enforced per chunk (invariant 3).
    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn process_entities(&self, entities: Vec<Entity>) -> Result<BulkWriteResult, BatchError> {
        self.process_chunked(entities, self.config.entity_batch_size, |chunk| {
            let adapter = Arc::clone(&self.adapter);
            async move { adapter.create_entities_bulk(chunk, &BulkWriteOptions::default()).await }
        })
        .await
    }

    #[instrument(skip(self, relationships), fields(count = relationships.len()))]
    pub async fn process_relationships(&self, relationships: Vec<Relationship>) -> Result<BulkWriteResult, BatchError> {
        self.process_chunked(relationships, self.config.relationship_batch_size, |chunk| {
            let adapter = Arc::clone(&self.adapter);
            async move { adapter.create_relationships_bulk(chunk, &BulkWriteOptions::default()).await }
        })
        .await
    }

    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn process_embeddings(&self, entities: Vec<Entity>) -> Result<BulkWriteResult, BatchError> {
        self.process_chunked(entities, self.config.embedding_batch_size, |chunk| {
            let adapter = Arc::clone(&self.adapter);
            async move { adapter.create_embeddings_batch(chunk, &BulkWriteOptions::default()).await }
        })
        .await
    }

    async fn process_chunked<T, F, Fut>(&self, items: Vec<T>, chunk_size: usize, write: F) -> Result<BulkWriteResult, BatchError>
    where
        T: HasId + Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: std::future::Future<Output = crate::graph_adapter::Result<BulkWriteResult>>,
    {
        if items.is_empty() {
            return Ok(BulkWriteResult::default());
        }
        let ids: Vec<String> = items.iter().map(HasId::id).collect();
        let key = compute_idempotency_key(&ids);
        let batch_id = format!("batch_{}", self.ids.next_seq());
        if !self.idempotency.check_and_record(&key) {
            return Err(BatchError::DuplicateBatch { batch_id: key });
        }
        let _ = self.emitter.emit(Event::BatchCreated(BatchCreatedPayload {
            at: chrono::Utc::now(),
            batch_id: batch_id.clone(),
            item_count: items.len(),
        }));

        let chunk_size = chunk_size.max(1);
        let mut total = BulkWriteResult::default();
        for chunk in items.chunks(chunk_size) {
            let result = write(chunk.to_vec()).await?;
            total = total.merge(result);
        }
        let _ = self.emitter.emit(Event::BatchCompleted(BatchCompletedPayload {
            at: chrono::Utc::now(),
            batch_id,
            processed: total.processed,
            failed: total.failed,
        }));
        Ok(total)
    }

    /// Fragment-DAG mode (spec §4.4): group by `event_id` (all fragments
    /// passed here are assumed to share one), topologically sort, and
    /// execute independent layers with entities preceding any relationship
    /// in the same layer that references them, unless the relationship's
    /// `data.deferred` flag is set.
    #[instrument(skip(self, fragments), fields(event_id, count = fragments.len()))]
    pub async fn process_fragments(&self, event_id: &str, fragments: Vec<ChangeFragment>) -> Result<BulkWriteResult, BatchError> {
        if !self.config.enable_dag {
            return self.process_fragments_flat(fragments).await;
        }
        let layers = layer_fragments(event_id, fragments)?;
        let mut total = BulkWriteResult::default();
        for layer in layers {
            let (entity_fragments, rest): (Vec<_>, Vec<_>) = layer
                .into_iter()
                .partition(|f| f.change_type == FragmentChangeType::Entity);
            let (deferred, immediate): (Vec<_>, Vec<_>) = rest.into_iter().partition(is_deferred);

            if !entity_fragments.is_empty() {
                let entities = entity_fragments.iter().filter_map(decode_entity).collect();
                total = total.merge(self.process_entities(entities).await?);
            }
            if !immediate.is_empty() {
                total = total.merge(self.write_mixed_fragments(immediate).await?);
            }
            if !deferred.is_empty() {
                total = total.merge(self.write_mixed_fragments(deferred).await?);
            }
        }
        Ok(total)
    }

    async fn process_fragments_flat(&self, fragments: Vec<ChangeFragment>) -> Result<BulkWriteResult, BatchError> {
        self.write_mixed_fragments(fragments).await
    }

    async fn write_mixed_fragments(&self, fragments: Vec<ChangeFragment>) -> Result<BulkWriteResult, BatchError> {
        let (relationship_fragments, embedding_fragments): (Vec<_>, Vec<_>) = fragments
            .into_iter()
            .partition(|f| f.change_type == FragmentChangeType::Relationship);
        let mut total = BulkWriteResult::default();
        if !relationship_fragments.is_empty() {
            let relationships = relationship_fragments.iter().filter_map(decode_relationship).collect();
            total = total.merge(self.process_relationships(relationships).await?);
        }
        if !embedding_fragments.is_empty() {
            let entities = embedding_fragments.iter().filter_map(decode_entity).collect();
            total = total.merge(self.process_embeddings(entities).await?);
        }
        Ok(total)
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.config.streaming.max_concurrent_writes
    }

    pub fn dependency_timeout(&self) -> Duration {
        self.config.dependency_timeout
    }
}

fn is_deferred(fragment: &ChangeFragment) -> bool {
    fragment
        .data
        .get("deferred")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn decode_entity(fragment: &ChangeFragment) -> Option<Entity> {
    serde_json::from_value(fragment.data.clone()).ok()
}

fn decode_relationship(fragment: &ChangeFragment) -> Option<Relationship> {
    serde_json::from_value(fragment.data.clone()).ok()
}

trait HasId {
    fn id(&self) -> String;
}

impl HasId for Entity {
    fn id(&self) -> String {
        self.id().to_string()
    }
}

impl HasId for Relationship {
    fn id(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{EventBus, MemorySink};
    use crate::graph_adapter::{GraphAdapterOptions, InMemoryGraphService};
    use crate::model::entity::EntityEnvelope;
    use crate::model::{FragmentOperation, RelationshipType};
    use serde_json::json;

    fn processor() -> (BatchProcessor, Arc<InMemoryGraphService>) {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let client = Arc::new(InMemoryGraphService::new());
        let adapter = Arc::new(GraphWriteAdapter::new(client.clone(), GraphAdapterOptions::default()));
        let processor = BatchProcessor::new(BatchConfig::default(), adapter, bus.get_emitter());
        (processor, client)
    }

    #[tokio::test]
    async fn duplicate_batch_within_ttl_is_rejected() {
        let (processor, _client) = processor();
        let entities = vec![Entity::File(EntityEnvelope::new("e1"))];
        processor.process_entities(entities.clone()).await.unwrap();
        let err = processor.process_entities(entities).await.unwrap_err();
        assert!(matches!(err, BatchError::DuplicateBatch { .. }));
    }

    #[tokio::test]
    async fn fragment_dag_writes_entities_before_relationship() {
        let (processor, client) = processor();
        let entity_a = Entity::File(EntityEnvelope::new("A"));
        let entity_b = Entity::File(EntityEnvelope::new("B"));
        let rel = Relationship::new(RelationshipType::DependsOn, "A", "B", None);

        let fragments = vec![
            ChangeFragment::new("fA", "evt1", FragmentChangeType::Entity, FragmentOperation::Add, serde_json::to_value(&entity_a).unwrap()),
            ChangeFragment::new("fB", "evt1", FragmentChangeType::Entity, FragmentOperation::Add, serde_json::to_value(&entity_b).unwrap()),
            ChangeFragment::new("fR", "evt1", FragmentChangeType::Relationship, FragmentOperation::Add, serde_json::to_value(&rel).unwrap())
                .depends_on("fA")
                .depends_on("fB"),
        ];
        let result = processor.process_fragments("evt1", fragments).await.unwrap();
        assert_eq!(result.processed, 3);
        assert_eq!(client.entity_count(), 2);
        assert_eq!(client.relationship_count(), 1);
    }

    #[tokio::test]
    async fn cyclic_fragments_perform_no_writes() {
        let (processor, client) = processor();
        let fragments = vec![
            ChangeFragment::new("fA", "evt1", FragmentChangeType::Entity, FragmentOperation::Add, json!({})).depends_on("fB"),
            ChangeFragment::new("fB", "evt1", FragmentChangeType::Entity, FragmentOperation::Add, json!({})).depends_on("fA"),
        ];
        let err = processor.process_fragments("evt1", fragments).await.unwrap_err();
        assert!(matches!(err, BatchError::DependencyCycle { .. }));
        assert_eq!(client.entity_count(), 0);
    }
}
