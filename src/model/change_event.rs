use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of a change detected upstream (file watcher, SCM
/// webhook, etc. — all out of scope, spec §1). C5 is the only producer
/// of [`Task`](super::task::Task)s from these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub event_id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ChangeEventKind,
    pub path: String,
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ChangeEventKind {
    FileAdded,
    FileChanged,
    FileDeleted,
    FileRenamed,
}

impl ChangeEvent {
    pub fn new(
        event_id: impl Into<String>,
        source: impl Into<String>,
        kind: ChangeEventKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            source: source.into(),
            timestamp: Utc::now(),
            kind,
            path: path.into(),
            priority: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}
