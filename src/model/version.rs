use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supplemented row type (spec §3: "every write emits a Version row and
/// updates `lastModified`"). Not itself named as a top-level model in
/// spec §3's enumerated list, but required by the lifecycle paragraph
/// that closes that section. Emitted by
/// [`crate::graph_adapter::GraphWriteAdapter`] for every successful
/// entity/relationship write, via
/// [`crate::graph_adapter::GraphServiceClient::record_versions`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Version {
    pub entity_id: String,
    pub last_modified: DateTime<Utc>,
    pub change_summary: String,
}

impl Version {
    pub fn new(entity_id: impl Into<String>, change_summary: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            last_modified: Utc::now(),
            change_summary: change_summary.into(),
        }
    }
}
