//! Process-local monotonic id generation.
//!
//! Mirrors the source repo's `utils::id_generator::IdGenerator` used by
//! `RuntimeConfig::default()` to mint run ids. Job ids follow the
//! `checkpoint_job_{epoch_ms}_{counter}` scheme from spec §4.10; the
//! counter is explicitly process-local (spec §9 — the one sanctioned
//! exception to "no hidden global state").

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Generates collision-resistant, monotonically-distinguishable ids.
///
/// `IdGenerator` is cheap to clone-by-reference (it is typically held
/// behind an `Arc`) and safe to share across threads.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// A random v4 UUID, used for entity/session/rollback-point ids where
    /// no deterministic derivation is specified.
    pub fn generate_uuid(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// `checkpoint_job_{epoch_ms}_{counter}`, monotonic within this process.
    pub fn generate_job_id(&self, epoch_ms: i64) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("checkpoint_job_{epoch_ms}_{n}")
    }

    /// Generic monotonic counter for callers that want their own prefix.
    pub fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_monotonic_within_process() {
        let gen = IdGenerator::new();
        let a = gen.generate_job_id(1_000);
        let b = gen.generate_job_id(1_000);
        assert_ne!(a, b);
        assert!(a.ends_with("_0"));
        assert!(b.ends_with("_1"));
    }
}
