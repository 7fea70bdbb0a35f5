use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Working,
    Broken,
    Resolved,
    Abandoned,
}

/// Multi-agent coordination context (spec §3). `events` is append-only
/// and strictly ordered by `seq` — see [`SessionEvent`] and invariant 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub agent_ids: HashSet<String>,
    pub state: SessionState,
    pub events: Vec<SessionEvent>,
    pub metadata: HashMap<String, Value>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let mut agent_ids = HashSet::new();
        agent_ids.insert(agent_id.into());
        Self {
            session_id: session_id.into(),
            agent_ids,
            state: SessionState::Working,
            events: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.events.last().map_or(1, |e| e.seq + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ChangeElementType {
    Entity,
    Relationship,
    Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeInfo {
    pub element_type: ChangeElementType,
    pub entity_ids: Vec<String>,
    pub operation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEventImpact {
    pub severity: String,
    pub perf_delta: Option<f64>,
}

/// A single, sequence-numbered action within a session (spec §3). `seq`
/// is 1-indexed and assigned by the session store/manager, never by the
/// caller — see invariant 1 and the §9 open question on seq authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub actor: String,
    pub change_info: ChangeInfo,
    pub state_transition: Option<StateTransition>,
    pub impact: Option<SessionEventImpact>,
}

impl SessionEvent {
    pub fn new(seq: u64, actor: impl Into<String>, change_info: ChangeInfo) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            event_type: "modified".to_string(),
            actor: actor.into(),
            change_info,
            state_transition: None,
            impact: None,
        }
    }

    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    #[must_use]
    pub fn with_transition(mut self, from: SessionState, to: SessionState) -> Self {
        self.state_transition = Some(StateTransition { from, to });
        self
    }

    #[must_use]
    pub fn with_impact(mut self, severity: impl Into<String>, perf_delta: Option<f64>) -> Self {
        self.impact = Some(SessionEventImpact {
            severity: severity.into(),
            perf_delta,
        });
        self
    }

    /// Significant transitions per spec §4.9: `working→broken`,
    /// `test_pass→broke` wording, `severity≥high`, `perfDelta<-5`.
    pub fn is_significant_transition(&self) -> bool {
        let transitioned_to_broken = self
            .state_transition
            .as_ref()
            .is_some_and(|t| t.to == SessionState::Broken);
        let high_severity = self
            .impact
            .as_ref()
            .is_some_and(|i| i.severity.eq_ignore_ascii_case("high") || i.severity.eq_ignore_ascii_case("critical"));
        let perf_regression = self
            .impact
            .as_ref()
            .and_then(|i| i.perf_delta)
            .is_some_and(|delta| delta < -5.0);
        transitioned_to_broken || high_severity || perf_regression
    }
}
