//! Path-heuristic priority assignment for incoming change events (spec
//! §4.5: "compute priority (file path heuristics + explicit)"). An
//! explicit `event.priority` always wins; otherwise we fall back to a
//! small set of path conventions common to source repositories.

use crate::model::{ChangeEvent, ChangeEventKind};

const PRIORITY_DELETE: u8 = 2;
const PRIORITY_MANIFEST: u8 = 3;
const PRIORITY_SOURCE: u8 = 4;
const PRIORITY_TEST: u8 = 6;
const PRIORITY_DOC: u8 = 7;
const PRIORITY_DEFAULT: u8 = 5;

/// Compute the priority band (0 highest, 9 lowest) for `event`.
pub fn compute_priority(event: &ChangeEvent) -> u8 {
    if let Some(explicit) = event.priority {
        return explicit.min(9);
    }
    if event.kind == ChangeEventKind::FileDeleted {
        // Deletions are cheap and should propagate quickly so the graph
        // doesn't keep serving stale entities.
        return PRIORITY_DELETE;
    }
    let path = event.path.to_ascii_lowercase();
    if is_manifest(&path) {
        PRIORITY_MANIFEST
    } else if is_test(&path) {
        PRIORITY_TEST
    } else if is_doc(&path) {
        PRIORITY_DOC
    } else if is_source(&path) {
        PRIORITY_SOURCE
    } else {
        PRIORITY_DEFAULT
    }
}

fn is_manifest(path: &str) -> bool {
    const MANIFESTS: &[&str] = &["cargo.toml", "package.json", "go.mod", "pyproject.toml", "pom.xml"];
    MANIFESTS.iter().any(|m| path.ends_with(m))
}

fn is_test(path: &str) -> bool {
    path.contains("/test/")
        || path.contains("/tests/")
        || path.contains("__tests__")
        || path.ends_with(".test.ts")
        || path.ends_with(".spec.ts")
        || path.contains("_test.go")
        || path.contains("test_")
}

fn is_doc(path: &str) -> bool {
    path.ends_with(".md") || path.contains("/docs/")
}

fn is_source(path: &str) -> bool {
    const SOURCE_EXTS: &[&str] = &[".rs", ".ts", ".tsx", ".js", ".jsx", ".py", ".go", ".java", ".rb"];
    SOURCE_EXTS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, kind: ChangeEventKind) -> ChangeEvent {
        ChangeEvent::new("e1", "watcher", kind, path)
    }

    #[test]
    fn explicit_priority_wins() {
        let e = event("src/lib.rs", ChangeEventKind::FileChanged).with_priority(9);
        assert_eq!(compute_priority(&e), 9);
    }

    #[test]
    fn deletions_are_high_priority() {
        let e = event("src/lib.rs", ChangeEventKind::FileDeleted);
        assert_eq!(compute_priority(&e), PRIORITY_DELETE);
    }

    #[test]
    fn manifests_outrank_plain_source() {
        let manifest = event("Cargo.toml", ChangeEventKind::FileChanged);
        let source = event("src/lib.rs", ChangeEventKind::FileChanged);
        assert!(compute_priority(&manifest) < compute_priority(&source));
    }

    #[test]
    fn tests_and_docs_are_lower_priority_than_source() {
        let test = event("src/tests/foo_test.go", ChangeEventKind::FileChanged);
        let doc = event("docs/readme.md", ChangeEventKind::FileChanged);
        let source = event("src/lib.rs", ChangeEventKind::FileChanged);
        assert!(compute_priority(&source) < compute_priority(&test));
        assert!(compute_priority(&test) < compute_priority(&doc));
    }
}
