//! C9: read-side join of session events with graph queries (spec §4.9).
//! Every graph call goes through the same [`GraphServiceClient`]
//! abstraction C6/C10 use, and every method here degrades to the
//! session-only subset on graph failure rather than propagating it —
//! the graph is enrichment, not a dependency for correctness.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{instrument, warn};

use crate::graph_adapter::GraphServiceClient;
use crate::model::{SessionEvent, SessionState};

use super::error::SessionBridgeError;
use super::manager::SessionManager;
use super::store::SessionStorageBackend;

/// Relationship types [`SessionBridge::get_transitions`] and
/// [`SessionBridge::get_handoff_context`] traverse for enrichment (spec
/// §4.9: `IMPACTS|IMPLEMENTS_CLUSTER|PERFORMS_FOR`). `IMPLEMENTS_CLUSTER`
/// is not in the closed `RelationshipType` set (spec §3); callers query
/// the graph by string label directly, as the graph schema is external
/// to this crate.
const ENRICHMENT_RELATIONSHIPS: &str = "IMPACTS|IMPLEMENTS_CLUSTER|PERFORMS_FOR";
const MAX_ENRICHMENT_HOPS: u32 = 2;

#[derive(Debug, Clone)]
pub struct Transition {
    pub session_id: String,
    pub event: SessionEvent,
    pub graph_context: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct EntityImpact {
    pub entity_id: String,
    pub touches: u32,
    pub severities: Vec<String>,
    pub avg_perf_delta: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct HandoffContext {
    pub session_id: String,
    pub joining_agent: String,
    pub recent_events: Vec<SessionEvent>,
    pub graph_context: Vec<Value>,
    pub advice: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionQueryOptions {
    pub limit: usize,
    pub include_resolved: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub state: SessionState,
    pub agent_ids: Vec<String>,
    pub last_seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionAggregates {
    pub session_count: usize,
    pub unique_agents: usize,
    pub outcome_histogram: HashMap<String, u32>,
    pub perf_avg: Option<f64>,
    pub perf_min: Option<f64>,
    pub perf_max: Option<f64>,
}

pub struct SessionBridge {
    store: Arc<dyn SessionStorageBackend>,
    manager: Arc<SessionManager>,
    graph: Arc<dyn GraphServiceClient>,
}

impl SessionBridge {
    pub fn new(
        store: Arc<dyn SessionStorageBackend>,
        manager: Arc<SessionManager>,
        graph: Arc<dyn GraphServiceClient>,
    ) -> Self {
        Self { store, manager, graph }
    }

    /// Best-effort ≤2-hop traversal over entity ids touched by `event`.
    /// Returns an empty list on any graph failure instead of propagating.
    async fn enrich(&self, entity_ids: &[String]) -> Vec<Value> {
        if entity_ids.is_empty() {
            return Vec::new();
        }
        match self
            .graph
            .query(
                &format!("MATCH ()-[:{ENRICHMENT_RELATIONSHIPS}*1..{MAX_ENRICHMENT_HOPS}]-() WHERE entity_id IN $ids RETURN *"),
                serde_json::json!({"entity_id": entity_ids.first()}),
            )
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%err, "session bridge: graph enrichment failed, degrading to session-only data");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self), err)]
    pub async fn get_transitions(&self, session_id: &str, entity_id: Option<&str>) -> Result<Vec<Transition>, SessionBridgeError> {
        let events = self.store.get_events(session_id, 1, u64::MAX).await?;
        let mut transitions = Vec::new();
        for event in events {
            if !event.is_significant_transition() {
                continue;
            }
            if let Some(entity_id) = entity_id
                && !event.change_info.entity_ids.iter().any(|id| id == entity_id)
            {
                continue;
            }
            let graph_context = self.enrich(&event.change_info.entity_ids).await;
            transitions.push(Transition {
                session_id: session_id.to_string(),
                event,
                graph_context,
            });
        }
        Ok(transitions)
    }

    #[instrument(skip(self), err)]
    pub async fn isolate_session(
        &self,
        session_id: &str,
        agent_id: &str,
    ) -> Result<(Vec<SessionEvent>, Vec<EntityImpact>), SessionBridgeError> {
        let events: Vec<SessionEvent> = self
            .store
            .get_events(session_id, 1, u64::MAX)
            .await?
            .into_iter()
            .filter(|e| e.actor == agent_id)
            .collect();

        let mut per_entity: HashMap<String, (u32, Vec<String>, Vec<f64>)> = HashMap::new();
        for event in &events {
            for entity_id in &event.change_info.entity_ids {
                let entry = per_entity.entry(entity_id.clone()).or_default();
                entry.0 += 1;
                if let Some(impact) = &event.impact {
                    entry.1.push(impact.severity.clone());
                    if let Some(delta) = impact.perf_delta {
                        entry.2.push(delta);
                    }
                }
            }
        }

        let impacts = per_entity
            .into_iter()
            .map(|(entity_id, (touches, severities, deltas))| EntityImpact {
                entity_id,
                touches,
                severities,
                avg_perf_delta: if deltas.is_empty() {
                    None
                } else {
                    Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
                },
            })
            .collect();

        Ok((events, impacts))
    }

    #[instrument(skip(self), err)]
    pub async fn get_handoff_context(&self, session_id: &str, joining_agent: &str, n: usize) -> Result<HandoffContext, SessionBridgeError> {
        let recent = self.store.get_recent_events(session_id, n.max(1)).await?;
        let entity_ids: Vec<String> = recent
            .iter()
            .flat_map(|e| e.change_info.entity_ids.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let graph_context = self.enrich(&entity_ids).await;

        let session = self.store.get_session(session_id).await?;
        let advice = match session.as_ref().map(|s| s.state) {
            Some(SessionState::Broken) => {
                "Session is currently broken; review the most recent transition before making further changes.".to_string()
            }
            Some(SessionState::Working) if recent.iter().any(|e| e.is_significant_transition()) => {
                "Recent events include a significant transition; check impact severity before continuing.".to_string()
            }
            Some(_) => "No outstanding issues detected in recent history.".to_string(),
            None => "Session has no recorded history yet.".to_string(),
        };

        Ok(HandoffContext {
            session_id: session_id.to_string(),
            joining_agent: joining_agent.to_string(),
            recent_events: recent,
            graph_context,
            advice,
        })
    }

    /// Best-effort anchor lookup: sessions the graph has recorded against
    /// `entity_id` via `SESSION_MODIFIED`/`SESSION_CHECKPOINT_LINK` edges.
    async fn anchored_session_ids(&self, entity_id: &str) -> Vec<String> {
        match self.graph.query("sessionsForEntity", serde_json::json!({"entity_id": entity_id})).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.get("sessionId").or_else(|| row.get("from")).and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            Err(err) => {
                warn!(%err, "session bridge: anchor lookup failed, degrading to session-only data");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self), err)]
    pub async fn query_sessions_by_entity(&self, entity_id: &str, options: SessionQueryOptions) -> Result<Vec<SessionSummary>, SessionBridgeError> {
        let limit = if options.limit == 0 { 50 } else { options.limit };

        let mut ids: HashSet<String> = self.anchored_session_ids(entity_id).await.into_iter().collect();
        for session in self.manager.list_active_sessions().await {
            if session.events.iter().any(|e| e.change_info.entity_ids.iter().any(|id| id == entity_id)) {
                ids.insert(session.session_id.clone());
            }
        }

        let mut summaries = Vec::new();
        for id in ids {
            if let Some(session) = self.store.get_session(&id).await? {
                if !options.include_resolved && matches!(session.state, SessionState::Resolved | SessionState::Abandoned) {
                    continue;
                }
                summaries.push(SessionSummary {
                    session_id: session.session_id,
                    state: session.state,
                    agent_ids: session.agent_ids.into_iter().collect(),
                    last_seq: session.events.last().map(|e| e.seq).unwrap_or(0),
                });
                if summaries.len() >= limit {
                    break;
                }
            }
        }
        Ok(summaries)
    }

    #[instrument(skip(self), err)]
    pub async fn get_session_aggregates(&self, entity_ids: &[String], options: SessionQueryOptions) -> Result<SessionAggregates, SessionBridgeError> {
        let mut session_ids: HashSet<String> = HashSet::new();
        for entity_id in entity_ids {
            for summary in self.query_sessions_by_entity(entity_id, options.clone()).await? {
                session_ids.insert(summary.session_id);
            }
        }

        let mut agents: HashSet<String> = HashSet::new();
        let mut outcome_histogram: HashMap<String, u32> = HashMap::new();
        let mut perf_deltas: Vec<f64> = Vec::new();

        for id in &session_ids {
            let Some(session) = self.store.get_session(id).await? else { continue };
            agents.extend(session.agent_ids.iter().cloned());
            let label = match session.state {
                SessionState::Working => "working",
                SessionState::Broken => "broken",
                SessionState::Resolved => "resolved",
                SessionState::Abandoned => "abandoned",
            };
            *outcome_histogram.entry(label.to_string()).or_insert(0) += 1;
            for event in &session.events {
                if !event.change_info.entity_ids.iter().any(|e| entity_ids.contains(e)) {
                    continue;
                }
                if let Some(delta) = event.impact.as_ref().and_then(|i| i.perf_delta) {
                    perf_deltas.push(delta);
                }
            }
        }

        Ok(SessionAggregates {
            session_count: session_ids.len(),
            unique_agents: agents.len(),
            outcome_histogram,
            perf_avg: if perf_deltas.is_empty() { None } else { Some(perf_deltas.iter().sum::<f64>() / perf_deltas.len() as f64) },
            perf_min: perf_deltas.iter().cloned().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v)))),
            perf_max: perf_deltas.iter().cloned().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v)))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointJobRunner, InMemoryJobPersistence};
    use crate::config::{CheckpointJobConfig, SessionConfig};
    use crate::event_bus::{EventBus, MemorySink};
    use crate::graph_adapter::{BulkWriteOptions, BulkWriteResult, CreateCheckpointOptions, GraphServiceError, InMemoryGraphService};
    use crate::model::{ChangeElementType, ChangeInfo, StateTransition};
    use crate::sessions::InMemorySessionStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingGraphService;

    #[async_trait]
    impl GraphServiceClient for FailingGraphService {
        async fn create_entities_bulk(&self, _: &[crate::model::Entity], _: &BulkWriteOptions) -> crate::graph_adapter::Result<BulkWriteResult> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn create_relationships_bulk(&self, _: &[crate::model::Relationship], _: &BulkWriteOptions) -> crate::graph_adapter::Result<BulkWriteResult> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn create_embeddings_batch(&self, _: &[crate::model::Entity], _: &BulkWriteOptions) -> crate::graph_adapter::Result<BulkWriteResult> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn create_entity(&self, _: &crate::model::Entity) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn create_relationship(&self, _: &crate::model::Relationship) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn upsert_entity_json(&self, _: &str, _: Value) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn delete_entity(&self, _: &str) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn upsert_relationship_json(&self, _: &str, _: Value) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn delete_relationship(&self, _: &str) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn create_checkpoint(&self, _: &[String], _: &CreateCheckpointOptions) -> crate::graph_adapter::Result<String> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn annotate_session_relationships_with_checkpoint(&self, _: &str, _: &str) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn create_session_checkpoint_link(&self, _: &str, _: &str, _: Value) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn delete_checkpoint(&self, _: &str) -> crate::graph_adapter::Result<()> {
            Err(GraphServiceError::Unavailable("down".into()))
        }
        async fn query(&self, _: &str, _: Value) -> crate::graph_adapter::Result<Vec<Value>> {
            Err(GraphServiceError::QueryFailed("graph offline".into()))
        }
    }

    fn change_info(entity_id: &str) -> ChangeInfo {
        ChangeInfo {
            element_type: ChangeElementType::Entity,
            entity_ids: vec![entity_id.into()],
            operation: "update".into(),
        }
    }

    async fn setup() -> (SessionBridge, Arc<SessionManager>) {
        let bus = Arc::new(EventBus::with_sink(MemorySink::new()));
        let store: Arc<dyn SessionStorageBackend> =
            Arc::new(InMemorySessionStore::new(Duration::from_secs(3600), Duration::from_millis(50)));
        let runner = CheckpointJobRunner::new(
            CheckpointJobConfig::default(),
            Arc::new(InMemoryGraphService::new()),
            Arc::new(InMemoryJobPersistence::new()),
            bus.get_emitter(),
        );
        let manager = Arc::new(SessionManager::new(Arc::clone(&store), runner, SessionConfig::default(), bus.get_emitter()));
        manager.create_session("s1", "a1", Default::default(), vec![]).await.unwrap();
        manager
            .emit_event("s1", "a1", change_info("e1"), Some(StateTransition { from: SessionState::Working, to: SessionState::Broken }))
            .await
            .unwrap();
        let bridge = SessionBridge::new(store, Arc::clone(&manager), Arc::new(FailingGraphService));
        (bridge, manager)
    }

    #[tokio::test]
    async fn get_transitions_detects_broken_transition_despite_graph_failure() {
        let (bridge, _manager) = setup().await;
        let transitions = bridge.get_transitions("s1", None).await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert!(transitions[0].graph_context.is_empty());
    }

    #[tokio::test]
    async fn isolate_session_filters_by_actor() {
        let (bridge, manager) = setup().await;
        manager.join_session("s1", "a2").await.unwrap();
        manager.emit_event("s1", "a2", change_info("e2"), None).await.unwrap();
        let (events, impacts) = bridge.isolate_session("s1", "a2").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(impacts.len(), 1);
        assert_eq!(impacts[0].entity_id, "e2");
    }

    #[tokio::test]
    async fn query_sessions_by_entity_falls_back_to_session_only() {
        let (bridge, _manager) = setup().await;
        let sessions = bridge.query_sessions_by_entity("e1", SessionQueryOptions::default()).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "s1");
    }
}
