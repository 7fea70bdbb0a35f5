//! Session-scoped pub/sub (spec §4.7: `session:{id}` + a global channel).
//!
//! The crate's [`crate::event_bus::Event`] set is closed (spec §9's fixed
//! event taxonomy) and carries no session-update variant, so this is a
//! second, purpose-built hub rather than a shoehorned `Event` payload —
//! same `tokio::sync::broadcast` shape as [`crate::event_bus::hub::EventHub`],
//! scoped to arbitrary session messages instead.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast::{self, Receiver, Sender};

pub const GLOBAL_CHANNEL: &str = "sessions:global";

pub fn session_channel(session_id: &str) -> String {
    format!("session:{session_id}")
}

#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub channel: String,
    pub message: Value,
    pub at: DateTime<Utc>,
}

/// Best-effort, at-least-once broadcast of [`SessionUpdate`]s. Consumers
/// subscribe once and filter by `channel` themselves — there is no
/// durable per-channel queue, matching spec §4.7's "pub/sub delivery is
/// at-least-once and best-effort; consumers must be idempotent."
pub struct SessionHub {
    sender: Sender<SessionUpdate>,
}

impl SessionHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, channel: impl Into<String>, message: Value) {
        let _ = self.sender.send(SessionUpdate {
            channel: channel.into(),
            message,
            at: Utc::now(),
        });
    }

    pub fn subscribe(&self) -> Receiver<SessionUpdate> {
        self.sender.subscribe()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(1024)
    }
}
