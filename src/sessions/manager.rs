//! C8: session manager layered on top of the C7 store (spec §4.8).
//! Assigns sequence numbers, drives the join/leave lifecycle, and hands
//! checkpointing off to [`CheckpointJobRunner`] rather than inlining
//! persistence, mirroring how the source repo's `AppRunner::checkpoint`
//! defers to a `Checkpointer` instead of writing state itself.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, instrument};

use crate::checkpoint::CheckpointJobRunner;
pub use crate::checkpoint::CheckpointOutcome;
use crate::config::SessionConfig;
use crate::event_bus::{Event, EventEmitter};
use crate::model::{
    ChangeInfo, CheckpointJobPayload, CheckpointReason, Session, SessionEvent, SessionState,
    StateTransition,
};

use super::error::SessionManagerError;
use super::store::{CreateSessionOptions, SessionStorageBackend};

/// `getTransitions`'s graph enrichment defaults to a 2-hop traversal
/// (spec §4.9); `checkpoint()` seeds its job with the same depth since
/// neither spec.md nor [`SessionConfig`] names a distinct constant for it.
const CHECKPOINT_HOP_COUNT: u32 = 2;

struct Counters {
    /// Next `seq` to assign, primed from the store at first touch
    /// (spec §4.8). The store remains the authority: a conflict here
    /// means another process (or a missed local update) got ahead of us,
    /// and we re-read rather than trust the cache.
    next_seq: u64,
    events_since_checkpoint: u64,
}

/// Sequence/lifecycle manager over a [`SessionStorageBackend`] (spec §4.8).
pub struct SessionManager {
    store: Arc<dyn SessionStorageBackend>,
    checkpoint_runner: Arc<CheckpointJobRunner>,
    config: SessionConfig,
    emitter: Arc<dyn EventEmitter>,
    counters: DashMap<String, Counters>,
    known_sessions: DashMap<String, ()>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStorageBackend>,
        checkpoint_runner: Arc<CheckpointJobRunner>,
        config: SessionConfig,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            store,
            checkpoint_runner,
            config,
            emitter,
            counters: DashMap::new(),
            known_sessions: DashMap::new(),
        }
    }

    #[instrument(skip(self, metadata), err)]
    pub async fn create_session(
        &self,
        session_id: &str,
        agent_id: &str,
        metadata: std::collections::HashMap<String, serde_json::Value>,
        initial_entity_ids: Vec<String>,
    ) -> Result<Session, SessionManagerError> {
        let session = self
            .store
            .create_session(
                session_id,
                agent_id,
                CreateSessionOptions {
                    ttl: Some(self.config.default_ttl),
                    metadata,
                    initial_entity_ids,
                },
            )
            .await?;
        self.known_sessions.insert(session_id.to_string(), ());
        self.counters.insert(
            session_id.to_string(),
            Counters {
                next_seq: 1,
                events_since_checkpoint: 0,
            },
        );
        Ok(session)
    }

    #[instrument(skip(self), err)]
    pub async fn join_session(&self, session_id: &str, agent_id: &str) -> Result<(), SessionManagerError> {
        self.store.add_agent(session_id, agent_id).await?;
        self.known_sessions.insert(session_id.to_string(), ());
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn leave_session(&self, session_id: &str, agent_id: &str) -> Result<(), SessionManagerError> {
        self.store.remove_agent(session_id, agent_id).await?;
        Ok(())
    }

    /// Allocate the next `seq` for `session_id`, priming the counter from
    /// the store on first touch (spec §4.8, §5's open question
    /// resolution: the store is authoritative; this counter is a cache).
    async fn next_seq(&self, session_id: &str) -> Result<u64, SessionManagerError> {
        if !self.counters.contains_key(session_id) {
            let session = self.store.get_session(session_id).await?.ok_or_else(|| {
                SessionManagerError::Store(super::error::SessionStoreError::NotFound(session_id.to_string()))
            })?;
            let next = session.events.last().map(|e| e.seq + 1).unwrap_or(1);
            self.counters.insert(
                session_id.to_string(),
                Counters {
                    next_seq: next,
                    events_since_checkpoint: 0,
                },
            );
        }
        // The priming branch above can race with a concurrent
        // `perform_maintenance`/`list_active_sessions` sweep that removes
        // this session's counter entry once the store reports it expired;
        // treat that the same as "session not found" rather than panicking.
        let mut entry = self.counters.get_mut(session_id).ok_or_else(|| {
            SessionManagerError::Store(super::error::SessionStoreError::NotFound(session_id.to_string()))
        })?;
        let seq = entry.next_seq;
        entry.next_seq += 1;
        Ok(seq)
    }

    /// Append an event, verifying the actor is a joined agent, assigning
    /// `seq`, and triggering an auto-checkpoint every
    /// `checkpointInterval` events (spec §4.8). `emitEvent` is the sole
    /// write path: sequence allocation and the store append both happen
    /// without yielding in between, so concurrent callers serialize
    /// cleanly through the per-session counter and the store's CAS-style
    /// append.
    #[instrument(skip(self, change_info, transition), err)]
    pub async fn emit_event(
        &self,
        session_id: &str,
        actor: &str,
        change_info: ChangeInfo,
        transition: Option<StateTransition>,
    ) -> Result<SessionEvent, SessionManagerError> {
        let session = self.store.get_session(session_id).await?.ok_or_else(|| {
            SessionManagerError::Store(super::error::SessionStoreError::NotFound(session_id.to_string()))
        })?;
        if !session.agent_ids.contains(actor) {
            return Err(SessionManagerError::AgentNotJoined {
                session_id: session_id.to_string(),
                agent_id: actor.to_string(),
            });
        }

        let seq = self.next_seq(session_id).await?;
        let mut event = SessionEvent::new(seq, actor, change_info);
        if let Some(transition) = transition {
            event = event.with_transition(transition.from, transition.to);
        }

        match self.store.add_event(session_id, event.clone()).await {
            Ok(()) => {}
            Err(super::error::SessionStoreError::SequenceConflict { expected, .. }) => {
                // The store rejected our cached seq; re-derive from it and
                // retry once, since it is the authority (DESIGN.md). Preserve
                // the accumulated auto-checkpoint count rather than
                // resetting it, since a seq conflict doesn't mean events
                // since the last checkpoint were lost.
                let carried_over = self
                    .counters
                    .remove(session_id)
                    .map(|(_, c)| c.events_since_checkpoint)
                    .unwrap_or(0);
                let mut entry = self.counters.entry(session_id.to_string()).or_insert(Counters {
                    next_seq: expected,
                    events_since_checkpoint: carried_over,
                });
                let seq = entry.next_seq;
                entry.next_seq += 1;
                drop(entry);
                event.seq = seq;
                self.store.add_event(session_id, event.clone()).await?;
            }
            Err(other) => return Err(other.into()),
        }

        let should_checkpoint = {
            let mut entry = self.counters.get_mut(session_id).ok_or_else(|| {
                SessionManagerError::Store(super::error::SessionStoreError::NotFound(session_id.to_string()))
            })?;
            entry.events_since_checkpoint += 1;
            if entry.events_since_checkpoint >= self.config.checkpoint_interval {
                entry.events_since_checkpoint = 0;
                true
            } else {
                false
            }
        };
        if should_checkpoint {
            if let Err(err) = self.checkpoint(session_id, CheckpointReason::Daily, None).await {
                tracing::warn!(%session_id, %err, "auto-checkpoint submission failed");
            }
        }

        Ok(event)
    }

    /// Submit a checkpoint job for `session_id` (spec §4.8(b)): snapshots
    /// recent events for the job payload, submits to C10 without
    /// blocking, sets the session TTL to `graceTTL`, and emits
    /// `checkpoint_complete` once the job reports success.
    #[instrument(skip(self), err)]
    pub async fn checkpoint(
        &self,
        session_id: &str,
        reason: CheckpointReason,
        window: Option<String>,
    ) -> Result<(), SessionManagerError> {
        let recent = self.store.get_recent_events(session_id, 50).await?;
        let seed_entity_ids: Vec<String> = recent
            .iter()
            .flat_map(|e| e.change_info.entity_ids.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();

        let payload = CheckpointJobPayload {
            session_id: session_id.to_string(),
            seed_entity_ids,
            reason,
            hop_count: CHECKPOINT_HOP_COUNT,
            window,
            annotations: None,
        };

        let (_job_id, rx) = self
            .checkpoint_runner
            .submit(payload)
            .await
            .map_err(|e| SessionManagerError::CheckpointSubmission(e.to_string()))?;

        self.store
            .set_ttl(session_id, self.config.grace_ttl.as_secs().max(1))
            .await?;

        // Submission is non-blocking (spec §4.8(b)); completion is
        // observed on a spawned task so `checkpoint()` itself returns
        // once the job is queued, not once it finishes.
        let store = Arc::clone(&self.store);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Ok(CheckpointOutcome::Completed { checkpoint_id }) = rx.await {
                store.publish_session_update(
                    &super::pubsub::session_channel(&session_id),
                    serde_json::json!({"type": "checkpoint_complete", "sessionId": session_id, "checkpointId": checkpoint_id}),
                );
            }
        });

        Ok(())
    }

    /// Sessions with `agent_id` among their joined agents, restricted to
    /// sessions this manager instance has touched (spec §4.8 —
    /// `SessionStorageBackend` exposes no native "list all" operation).
    #[instrument(skip(self))]
    pub async fn get_sessions_by_agent(&self, agent_id: &str) -> Vec<Session> {
        let keys: Vec<String> = self.known_sessions.iter().map(|e| e.key().clone()).collect();
        let mut out = Vec::new();
        for key in keys {
            if let Ok(Some(session)) = self.store.get_session(&key).await
                && session.agent_ids.contains(agent_id)
            {
                out.push(session);
            }
        }
        out
    }

    /// All known sessions still live (not expired, not `Resolved`/`Abandoned`).
    #[instrument(skip(self))]
    pub async fn list_active_sessions(&self) -> Vec<Session> {
        let keys: Vec<String> = self.known_sessions.iter().map(|e| e.key().clone()).collect();
        let mut out = Vec::new();
        let mut stale = Vec::new();
        for key in keys {
            match self.store.get_session(&key).await {
                Ok(Some(session)) if matches!(session.state, SessionState::Working | SessionState::Broken) => {
                    out.push(session);
                }
                Ok(Some(_)) => {}
                Ok(None) => stale.push(key),
                Err(_) => {}
            }
        }
        for id in stale {
            self.known_sessions.remove(&id);
            self.counters.remove(&id);
        }
        out
    }

    /// Periodic sweep: drop tracking for sessions the store has already
    /// expired, so `known_sessions`/`counters` don't grow unbounded.
    #[instrument(skip(self))]
    pub async fn perform_maintenance(&self) -> usize {
        let keys: Vec<String> = self.known_sessions.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;
        let mut stale = Vec::new();
        for key in keys {
            if !matches!(self.store.exists(&key).await, Ok(true)) {
                stale.push(key);
            }
        }
        for id in stale {
            self.known_sessions.remove(&id);
            self.counters.remove(&id);
            removed += 1;
        }
        if removed > 0 {
            let _ = self
                .emitter
                .emit(Event::metrics_updated("session_manager", serde_json::json!({"swept": removed})));
        }
        info!(removed, "session manager maintenance sweep complete");
        removed
    }

    /// Lightweight liveness probe: can the store be reached.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> bool {
        self.store.exists("__health_check_probe__").await.is_ok()
    }

    /// Release resources held by this manager; does not touch the store
    /// itself since ownership of shutdown belongs to whoever constructed
    /// it (spec §5 — `stop()` drains, doesn't tear down shared backends).
    pub async fn close(&self) {
        self.known_sessions.clear();
        self.counters.clear();
    }
}
