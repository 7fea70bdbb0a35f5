use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Closed set of edge types the graph recognizes (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RelationshipType {
    Imports,
    Exports,
    Calls,
    References,
    DependsOn,
    Implements,
    Extends,
    TypeUses,
    Tests,
    Documents,
    PerformsFor,
    Impacts,
    SessionModified,
    SessionCheckpointLink,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Exports => "EXPORTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::References => "REFERENCES",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::TypeUses => "TYPE_USES",
            RelationshipType::Tests => "TESTS",
            RelationshipType::Documents => "DOCUMENTS",
            RelationshipType::PerformsFor => "PERFORMS_FOR",
            RelationshipType::Impacts => "IMPACTS",
            RelationshipType::SessionModified => "SESSION_MODIFIED",
            RelationshipType::SessionCheckpointLink => "SESSION_CHECKPOINT_LINK",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: RelationshipType,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub version: u64,
    pub metadata: HashMap<String, Value>,
}

impl Relationship {
    pub fn new(
        rel_type: RelationshipType,
        from_entity_id: impl Into<String>,
        to_entity_id: impl Into<String>,
        discriminator: Option<&str>,
    ) -> Self {
        let from_entity_id = from_entity_id.into();
        let to_entity_id = to_entity_id.into();
        let id = super::ids::derive_relationship_id(&from_entity_id, rel_type, &to_entity_id, discriminator);
        let now = Utc::now();
        Self {
            id,
            rel_type,
            from_entity_id,
            to_entity_id,
            created: now,
            last_modified: now,
            version: 1,
            metadata: HashMap::new(),
        }
    }
}
