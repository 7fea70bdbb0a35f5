//! Session subsystem: durable event-ordered session store (C7), the
//! sequence/lifecycle manager layered on it (C8), and the read-side
//! graph-join bridge (C9). See spec §4.7–§4.9.

mod bridge;
mod error;
mod manager;
mod pubsub;
#[cfg(feature = "redis-store")]
mod redis_store;
mod store;

pub use bridge::{
    EntityImpact, HandoffContext, SessionAggregates, SessionBridge, SessionQueryOptions,
    SessionSummary, Transition,
};
pub use error::{SessionBridgeError, SessionManagerError, SessionStoreError};
pub use manager::{CheckpointOutcome, SessionManager};
pub use pubsub::{session_channel, SessionHub, SessionUpdate, GLOBAL_CHANNEL};
#[cfg(feature = "redis-store")]
pub use redis_store::RedisSessionStore;
pub use store::{CreateSessionOptions, InMemorySessionStore, SessionStorageBackend};
