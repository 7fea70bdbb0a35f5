use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Smallest unit of graph mutation derived from one [`ChangeEvent`]
/// (spec §3). Fragments sharing an `event_id` form a DAG via
/// `dependency_hints`; C4 topologically sorts them before writing.
///
/// [`ChangeEvent`]: super::change_event::ChangeEvent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeFragment {
    pub id: String,
    pub event_id: String,
    pub change_type: FragmentChangeType,
    pub operation: FragmentOperation,
    pub data: Value,
    pub dependency_hints: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FragmentChangeType {
    Entity,
    Relationship,
    Embedding,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FragmentOperation {
    Add,
    Update,
    Delete,
}

impl ChangeFragment {
    pub fn new(
        id: impl Into<String>,
        event_id: impl Into<String>,
        change_type: FragmentChangeType,
        operation: FragmentOperation,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            event_id: event_id.into(),
            change_type,
            operation,
            data,
            dependency_hints: Vec::new(),
            confidence: 1.0,
        }
    }

    #[must_use]
    pub fn depends_on(mut self, fragment_id: impl Into<String>) -> Self {
        self.dependency_hints.push(fragment_id.into());
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}
