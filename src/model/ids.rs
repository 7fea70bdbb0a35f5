//! Deterministic id derivation (spec §3 invariants on `Entity.id` and
//! `Relationship.id`).
//!
//! Ids must be stable across ingestion runs for the same logical element,
//! so derivation must not depend on wall-clock time, process state, or
//! insertion order — only on the fields spec.md names. `rustc_hash`'s
//! `FxHasher` is seeded deterministically (unlike `RandomState`), which
//! makes it a fine non-cryptographic fit here; collision resistance
//! matters less than two runs agreeing.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

use super::relationship::RelationshipType;

fn fingerprint(parts: &[&str]) -> u64 {
    let mut hasher = FxHasher::default();
    for part in parts {
        part.hash(&mut hasher);
        0u8.hash(&mut hasher); // field separator, avoids "ab"+"c" == "a"+"bc" collisions
    }
    hasher.finish()
}

/// `id` is content-and-path derived: same `(kind, path, content_hash)` always
/// yields the same entity id, regardless of when or how many times it runs.
pub fn derive_entity_id(kind: &str, path: &str, content_hash: &str) -> String {
    format!("ent_{:016x}", fingerprint(&[kind, path, content_hash]))
}

/// Canonical from `(fromEntityId, type, toEntityId[, discriminator])`. The
/// discriminator covers relationship types that can legitimately repeat
/// between the same two entities (e.g. multiple `CALLS` call-sites).
pub fn derive_relationship_id(
    from_entity_id: &str,
    rel_type: RelationshipType,
    to_entity_id: &str,
    discriminator: Option<&str>,
) -> String {
    let discriminator = discriminator.unwrap_or("");
    format!(
        "rel_{:016x}",
        fingerprint(&[from_entity_id, rel_type.as_str(), to_entity_id, discriminator])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_stable_across_calls() {
        let a = derive_entity_id("File", "src/lib.rs", "deadbeef");
        let b = derive_entity_id("File", "src/lib.rs", "deadbeef");
        assert_eq!(a, b);
    }

    #[test]
    fn entity_id_changes_with_content_hash() {
        let a = derive_entity_id("File", "src/lib.rs", "deadbeef");
        let b = derive_entity_id("File", "src/lib.rs", "cafefeed");
        assert_ne!(a, b);
    }

    #[test]
    fn relationship_id_is_order_sensitive() {
        let a = derive_relationship_id("e1", RelationshipType::Calls, "e2", None);
        let b = derive_relationship_id("e2", RelationshipType::Calls, "e1", None);
        assert_ne!(a, b);
    }

    #[test]
    fn relationship_id_distinguishes_by_discriminator() {
        let a = derive_relationship_id("e1", RelationshipType::Calls, "e2", Some("call-site:12"));
        let b = derive_relationship_id("e1", RelationshipType::Calls, "e2", Some("call-site:40"));
        assert_ne!(a, b);
    }
}
