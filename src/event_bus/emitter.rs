use std::fmt;
use thiserror::Error;

use super::event::Event;

/// Abstract event emitter that components hold without needing to know
/// about the hub's transport.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    fn emit(&self, event: Event) -> Result<(), EmitterError>;
}

#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event hub closed")]
    Closed,
    #[error("event lag exceeded buffer; dropped {0} messages")]
    Lagged(usize),
    #[error("event emission failed: {0}")]
    Other(String),
}

impl EmitterError {
    pub fn other(error: impl Into<String>) -> Self {
        Self::Other(error.into())
    }
}
