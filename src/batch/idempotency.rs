//! Idempotency tracking (spec §4.4, glossary): a batch's key is derived
//! from the sorted ids it contains; re-applying the same key within
//! `idempotency_key_ttl` is refused (invariant 3).

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

pub fn compute_idempotency_key(ids: &[String]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    let mut hasher = FxHasher::default();
    for id in &sorted {
        id.hash(&mut hasher);
        0u8.hash(&mut hasher);
    }
    format!("idem_{:016x}", hasher.finish())
}

/// Process-local "already applied" tracker. A `dashmap` so concurrent
/// batch submissions across `max_concurrent_batches` don't serialize on
/// one lock for the common case.
pub struct IdempotencyTracker {
    ttl: Duration,
    seen: DashMap<String, Instant>,
}

impl IdempotencyTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: DashMap::new(),
        }
    }

    /// Returns `true` and records the key if this is the first time it's
    /// been seen within the TTL window; `false` if it's a duplicate.
    pub fn check_and_record(&self, key: &str) -> bool {
        let now = Instant::now();
        if let Some(seen_at) = self.seen.get(key)
            && now.duration_since(*seen_at) < self.ttl
        {
            return false;
        }
        self.seen.insert(key.to_string(), now);
        true
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = compute_idempotency_key(&["e1".into(), "e2".into()]);
        let b = compute_idempotency_key(&["e2".into(), "e1".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_within_ttl_is_rejected() {
        let tracker = IdempotencyTracker::new(Duration::from_secs(300));
        assert!(tracker.check_and_record("k1"));
        assert!(!tracker.check_and_record("k1"));
    }

    #[test]
    fn duplicate_after_ttl_is_accepted() {
        let tracker = IdempotencyTracker::new(Duration::from_millis(10));
        assert!(tracker.check_and_record("k1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(tracker.check_and_record("k1"));
    }
}
