use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Tagged union over every node type the knowledge graph recognizes
/// (spec §3). All variants carry the common envelope fields; only
/// `Symbol` carries a further discriminant (`SymbolKind`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Entity {
    File(EntityEnvelope),
    Directory(EntityEnvelope),
    Module(EntityEnvelope),
    Symbol {
        #[serde(flatten)]
        envelope: EntityEnvelope,
        kind: SymbolKind,
    },
    Test(EntityEnvelope),
    Spec(EntityEnvelope),
    Documentation(EntityEnvelope),
    BusinessDomain(EntityEnvelope),
    SemanticCluster(EntityEnvelope),
    SecurityIssue(EntityEnvelope),
    Checkpoint(EntityEnvelope),
    Version(EntityEnvelope),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    TypeAlias,
    Variable,
    Property,
    Method,
}

/// Fields common to every [`Entity`] variant (spec §3: "All carry
/// `{id, type, path?, hash?, language?, created, lastModified, metadata}`").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityEnvelope {
    pub id: String,
    pub path: Option<String>,
    pub hash: Option<String>,
    pub language: Option<String>,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl EntityEnvelope {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            path: None,
            hash: None,
            language: None,
            created: now,
            last_modified: now,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

impl Entity {
    pub fn envelope(&self) -> &EntityEnvelope {
        match self {
            Entity::File(e)
            | Entity::Directory(e)
            | Entity::Module(e)
            | Entity::Test(e)
            | Entity::Spec(e)
            | Entity::Documentation(e)
            | Entity::BusinessDomain(e)
            | Entity::SemanticCluster(e)
            | Entity::SecurityIssue(e)
            | Entity::Checkpoint(e)
            | Entity::Version(e) => e,
            Entity::Symbol { envelope, .. } => envelope,
        }
    }

    pub fn id(&self) -> &str {
        &self.envelope().id
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Entity::File(_) => "File",
            Entity::Directory(_) => "Directory",
            Entity::Module(_) => "Module",
            Entity::Symbol { .. } => "Symbol",
            Entity::Test(_) => "Test",
            Entity::Spec(_) => "Spec",
            Entity::Documentation(_) => "Documentation",
            Entity::BusinessDomain(_) => "BusinessDomain",
            Entity::SemanticCluster(_) => "SemanticCluster",
            Entity::SecurityIssue(_) => "SecurityIssue",
            Entity::Checkpoint(_) => "Checkpoint",
            Entity::Version(_) => "Version",
        }
    }
}
