//! The AST-parsing step is an external collaborator (spec §1: "parsing
//! source code" is explicitly out of scope). `FragmentExtractor` is the
//! abstract seam C5 calls into to turn one [`ChangeEvent`] into the
//! [`ChangeFragment`]s C4 consumes — mirroring how [`crate::graph_adapter`]
//! abstracts the graph database itself.

use async_trait::async_trait;

use crate::model::{ChangeEvent, ChangeFragment};

use super::error::IngestionError;

#[async_trait]
pub trait FragmentExtractor: Send + Sync {
    async fn extract(&self, event: &ChangeEvent) -> Result<Vec<ChangeFragment>, IngestionError>;
}

/// Extracts nothing; used where no real parser is wired in (tests, and
/// any deployment that only ever calls `process_change_fragments`
/// directly).
#[derive(Debug, Default)]
pub struct NullFragmentExtractor;

#[async_trait]
impl FragmentExtractor for NullFragmentExtractor {
    async fn extract(&self, _event: &ChangeEvent) -> Result<Vec<ChangeFragment>, IngestionError> {
        Ok(Vec::new())
    }
}
