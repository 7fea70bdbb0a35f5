//! C7: session store (spec §4.7). Durable per-session state, an ordered
//! gap-free event log, and pub/sub — behind a `SessionStorageBackend`
//! trait so the default in-process implementation and the
//! `redis-store`-gated one share one contract, mirroring how
//! `weavegraph::runtimes::checkpointer::Checkpointer` splits in-memory
//! and SQLite behind one trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast::Receiver;

use crate::model::{Session, SessionEvent};

use super::error::SessionStoreError;
use super::pubsub::{session_channel, SessionHub, SessionUpdate, GLOBAL_CHANNEL};

#[derive(Debug, Clone, Default)]
pub struct CreateSessionOptions {
    pub ttl: Option<Duration>,
    pub metadata: HashMap<String, Value>,
    pub initial_entity_ids: Vec<String>,
}

#[async_trait]
pub trait SessionStorageBackend: Send + Sync {
    async fn create_session(&self, id: &str, agent_id: &str, opts: CreateSessionOptions) -> Result<Session, SessionStoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, SessionStoreError>;

    /// Append `event` to the ordered log; rejected unless `event.seq`
    /// exactly continues the log (spec §4.7 invariant: "strictly ordered
    /// ... and gap-free").
    async fn add_event(&self, id: &str, event: SessionEvent) -> Result<(), SessionStoreError>;

    async fn get_events(&self, id: &str, from_seq: u64, to_seq: u64) -> Result<Vec<SessionEvent>, SessionStoreError>;

    async fn get_recent_events(&self, id: &str, n: usize) -> Result<Vec<SessionEvent>, SessionStoreError>;

    async fn add_agent(&self, id: &str, agent_id: &str) -> Result<(), SessionStoreError>;

    /// Remove `agent_id`; when it was the last agent, set grace TTL on
    /// the session (spec §4.7).
    async fn remove_agent(&self, id: &str, agent_id: &str) -> Result<(), SessionStoreError>;

    async fn set_ttl(&self, id: &str, seconds: u64) -> Result<(), SessionStoreError>;

    async fn exists(&self, id: &str) -> Result<bool, SessionStoreError>;

    async fn delete(&self, id: &str) -> Result<(), SessionStoreError>;

    fn publish_session_update(&self, channel: &str, message: Value);

    fn subscribe(&self) -> Receiver<SessionUpdate>;
}

struct StoredSession {
    session: Session,
    expires_at: Instant,
    default_ttl: Duration,
}

/// Default `dashmap`-backed [`SessionStorageBackend`]. TTL is tracked
/// lazily (checked and swept on access) rather than with a background
/// reaper, matching the rest of this crate's preference for on-demand
/// cleanup over dedicated timer tasks (see [`crate::resilience::dead_letter`]).
pub struct InMemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    default_ttl: Duration,
    grace_ttl: Duration,
    hub: SessionHub,
}

impl InMemorySessionStore {
    pub fn new(default_ttl: Duration, grace_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            default_ttl,
            grace_ttl,
            hub: SessionHub::default(),
        }
    }

    fn is_live(stored: &StoredSession) -> bool {
        Instant::now() < stored.expires_at
    }

    fn sweep_if_expired(&self, id: &str) {
        let expired = self.sessions.get(id).is_some_and(|s| !Self::is_live(&s));
        if expired {
            self.sessions.remove(id);
        }
    }
}

#[async_trait]
impl SessionStorageBackend for InMemorySessionStore {
    async fn create_session(&self, id: &str, agent_id: &str, opts: CreateSessionOptions) -> Result<Session, SessionStoreError> {
        self.sweep_if_expired(id);
        if self.sessions.contains_key(id) {
            return Err(SessionStoreError::SessionExists(id.to_string()));
        }
        let mut session = Session::new(id, agent_id);
        session.metadata = opts.metadata;
        if !opts.initial_entity_ids.is_empty() {
            session
                .metadata
                .insert("initialEntityIds".to_string(), serde_json::json!(opts.initial_entity_ids));
        }
        let ttl = opts.ttl.unwrap_or(self.default_ttl);
        self.sessions.insert(
            id.to_string(),
            StoredSession {
                session: session.clone(),
                expires_at: Instant::now() + ttl,
                default_ttl: ttl,
            },
        );
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, SessionStoreError> {
        self.sweep_if_expired(id);
        Ok(self.sessions.get(id).map(|s| s.session.clone()))
    }

    async fn add_event(&self, id: &str, event: SessionEvent) -> Result<(), SessionStoreError> {
        self.sweep_if_expired(id);
        let mut entry = self.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        let expected = entry.session.next_seq();
        if event.seq != expected {
            return Err(SessionStoreError::SequenceConflict { expected, got: event.seq });
        }
        if let Some(transition) = &event.state_transition {
            entry.session.state = transition.to;
        }
        entry.session.events.push(event.clone());
        entry.expires_at = Instant::now() + entry.default_ttl;
        drop(entry);
        self.publish_session_update(&session_channel(id), serde_json::json!({"sessionId": id, "seq": event.seq}));
        Ok(())
    }

    async fn get_events(&self, id: &str, from_seq: u64, to_seq: u64) -> Result<Vec<SessionEvent>, SessionStoreError> {
        self.sweep_if_expired(id);
        let entry = self.sessions.get(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        Ok(entry
            .session
            .events
            .iter()
            .filter(|e| e.seq >= from_seq && e.seq <= to_seq)
            .cloned()
            .collect())
    }

    async fn get_recent_events(&self, id: &str, n: usize) -> Result<Vec<SessionEvent>, SessionStoreError> {
        self.sweep_if_expired(id);
        let entry = self.sessions.get(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        let events = &entry.session.events;
        let start = events.len().saturating_sub(n);
        Ok(events[start..].to_vec())
    }

    async fn add_agent(&self, id: &str, agent_id: &str) -> Result<(), SessionStoreError> {
        self.sweep_if_expired(id);
        let mut entry = self.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        entry.session.agent_ids.insert(agent_id.to_string());
        Ok(())
    }

    async fn remove_agent(&self, id: &str, agent_id: &str) -> Result<(), SessionStoreError> {
        self.sweep_if_expired(id);
        let mut entry = self.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        entry.session.agent_ids.remove(agent_id);
        if entry.session.agent_ids.is_empty() {
            entry.expires_at = Instant::now() + self.grace_ttl;
        }
        Ok(())
    }

    async fn set_ttl(&self, id: &str, seconds: u64) -> Result<(), SessionStoreError> {
        self.sweep_if_expired(id);
        let mut entry = self.sessions.get_mut(id).ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        entry.expires_at = Instant::now() + Duration::from_secs(seconds);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, SessionStoreError> {
        self.sweep_if_expired(id);
        Ok(self.sessions.contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<(), SessionStoreError> {
        self.sessions.remove(id);
        Ok(())
    }

    fn publish_session_update(&self, channel: &str, message: Value) {
        self.hub.publish(channel.to_string(), message.clone());
        if channel != GLOBAL_CHANNEL {
            self.hub.publish(GLOBAL_CHANNEL, message);
        }
    }

    fn subscribe(&self) -> Receiver<SessionUpdate> {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeElementType, ChangeInfo};

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new(Duration::from_secs(3600), Duration::from_millis(50))
    }

    fn change_info() -> ChangeInfo {
        ChangeInfo {
            element_type: ChangeElementType::Entity,
            entity_ids: vec!["e1".into()],
            operation: "update".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = store();
        store.create_session("s1", "a1", CreateSessionOptions::default()).await.unwrap();
        let err = store.create_session("s1", "a1", CreateSessionOptions::default()).await.unwrap_err();
        assert!(matches!(err, SessionStoreError::SessionExists(_)));
    }

    #[tokio::test]
    async fn events_must_be_gap_free() {
        let store = store();
        store.create_session("s1", "a1", CreateSessionOptions::default()).await.unwrap();
        store.add_event("s1", SessionEvent::new(1, "a1", change_info())).await.unwrap();
        let err = store.add_event("s1", SessionEvent::new(3, "a1", change_info())).await.unwrap_err();
        assert!(matches!(err, SessionStoreError::SequenceConflict { expected: 2, got: 3 }));
    }

    #[tokio::test]
    async fn last_agent_leaving_sets_grace_ttl() {
        let store = store();
        store.create_session("s1", "a1", CreateSessionOptions::default()).await.unwrap();
        store.remove_agent("s1", "a1").await.unwrap();
        assert!(store.exists("s1").await.unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!store.exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn get_recent_events_returns_tail() {
        let store = store();
        store.create_session("s1", "a1", CreateSessionOptions::default()).await.unwrap();
        for seq in 1..=5 {
            store.add_event("s1", SessionEvent::new(seq, "a1", change_info())).await.unwrap();
        }
        let recent = store.get_recent_events("s1", 2).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4, 5]);
    }
}
