//! Path-by-path diff engine (spec §4.11): compares a snapshot's captured
//! payload against the equivalent live state and emits [`DiffEntry`]
//! create/update/delete entries describing what rolling back would change.
//!
//! Both sides are arbitrary JSON (a snapshot's `payload` is opaque to this
//! crate, spec §3); comparison works by flattening each to a `path ->
//! leaf value` map first, so the diff is agnostic to whether the payload
//! represents an entity's attributes, a relationship's properties or a
//! session's state.

use std::collections::HashMap;

use serde_json::Value;

use crate::model::{DiffEntry, DiffOperation};

/// Flattens a JSON value into `path -> leaf value` pairs. Objects recurse
/// with dotted paths (`a.b`), arrays with bracketed indices (`a[0]`).
/// Empty objects/arrays and scalars are leaves in their own right so an
/// empty collection is still diffable against a populated one.
pub fn flatten(value: &Value) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut HashMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(&path, child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                flatten_into(&path, child, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Inverse of [`flatten`]: sets the leaf at a dotted/bracketed `path`
/// inside `target` to `value`, or removes it when `value` is `None`,
/// creating intermediate objects/arrays as needed. Used by the rollback
/// manager to reconstruct a whole entity/relationship payload from the
/// resolved per-leaf values of a diff before writing it back (spec §4.11
/// execute path).
pub fn set_path(target: &mut Value, path: &str, value: Option<Value>) {
    let segments = path_segments(path);
    set_segments(target, &segments, value);
}

/// Splits a path like `a.b[0].c` into `["a", "b", "0", "c"]`.
fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            if bracket > 0 {
                segments.push(rest[..bracket].to_string());
            }
            rest = &rest[bracket..];
            while let Some(close) = rest.find(']') {
                segments.push(rest[1..close].to_string());
                rest = &rest[close + 1..];
            }
        } else if !rest.is_empty() {
            segments.push(rest.to_string());
        }
    }
    segments
}

fn set_segments(target: &mut Value, segments: &[String], value: Option<Value>) {
    let Some((head, rest)) = segments.split_first() else { return };

    if let Ok(index) = head.parse::<usize>() {
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        let arr = target.as_array_mut().expect("just coerced to array");
        while arr.len() <= index {
            arr.push(Value::Null);
        }
        if rest.is_empty() {
            arr[index] = value.unwrap_or(Value::Null);
        } else {
            set_segments(&mut arr[index], rest, value);
        }
        return;
    }

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let obj = target.as_object_mut().expect("just coerced to object");
    if rest.is_empty() {
        match value {
            Some(v) => {
                obj.insert(head.clone(), v);
            }
            None => {
                obj.remove(head);
            }
        }
    } else {
        let entry = obj.entry(head.clone()).or_insert(Value::Object(serde_json::Map::new()));
        set_segments(entry, rest, value);
    }
}

/// Splits a prefixed diff path (`"entity:e1.metadata.tag"`) into its
/// snapshot-type prefix, id, and the remaining dotted path within that
/// id's object, if any. Shared by [`super::manager::RollbackManager`]'s
/// conflict re-check and its write-back grouping.
pub fn split_prefixed_path(path: &str) -> Option<(&str, &str, Option<&str>)> {
    let (prefix, rest) = path.split_once(':')?;
    match rest.split_once('.') {
        Some((id, leaf)) => Some((prefix, id, Some(leaf))),
        None => Some((prefix, rest, None)),
    }
}

/// Diffs a rollback target (`snapshot`) against the current live state.
/// A path present in the snapshot but missing from current needs
/// recreating; present in both but differing needs updating back to the
/// snapshot's value; present in current but absent from the snapshot
/// didn't exist at capture time and needs deleting.
pub fn diff_payload(snapshot: &Value, current: &Value) -> Vec<DiffEntry> {
    let snapshot_paths = flatten(snapshot);
    let current_paths = flatten(current);
    let mut entries = Vec::with_capacity(snapshot_paths.len());

    for (path, snapshot_value) in &snapshot_paths {
        match current_paths.get(path) {
            None => entries.push(DiffEntry {
                path: path.clone(),
                operation: DiffOperation::Create,
                old_value: None,
                new_value: Some(snapshot_value.clone()),
                metadata: None,
            }),
            Some(current_value) if current_value != snapshot_value => entries.push(DiffEntry {
                path: path.clone(),
                operation: DiffOperation::Update,
                old_value: Some(current_value.clone()),
                new_value: Some(snapshot_value.clone()),
                metadata: None,
            }),
            Some(_) => {}
        }
    }

    for (path, current_value) in &current_paths {
        if !snapshot_paths.contains_key(path) {
            entries.push(DiffEntry {
                path: path.clone(),
                operation: DiffOperation::Delete,
                old_value: Some(current_value.clone()),
                new_value: None,
                metadata: None,
            });
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_objects_and_arrays() {
        let value = json!({"a": {"b": 1, "c": [10, 20]}});
        let flat = flatten(&value);
        assert_eq!(flat.get("a.b"), Some(&json!(1)));
        assert_eq!(flat.get("a.c[0]"), Some(&json!(10)));
        assert_eq!(flat.get("a.c[1]"), Some(&json!(20)));
    }

    #[test]
    fn diff_detects_create_update_delete() {
        let snapshot = json!({"name": "alice", "role": "admin"});
        let current = json!({"name": "alice", "role": "viewer", "extra": "stale"});
        let mut entries = diff_payload(&snapshot, &current);
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(entries.len(), 2);
        let extra = entries.iter().find(|e| e.path == "extra").unwrap();
        assert_eq!(extra.operation, DiffOperation::Delete);
        let role = entries.iter().find(|e| e.path == "role").unwrap();
        assert_eq!(role.operation, DiffOperation::Update);
        assert_eq!(role.new_value, Some(json!("admin")));
    }

    #[test]
    fn set_path_round_trips_through_flatten() {
        let value = json!({"a": {"b": 1, "c": [10, 20]}});
        let flat = flatten(&value);

        let mut rebuilt = Value::Object(serde_json::Map::new());
        for (path, leaf) in &flat {
            set_path(&mut rebuilt, path, Some(leaf.clone()));
        }
        assert_eq!(rebuilt, value);
    }

    #[test]
    fn set_path_removes_leaf_when_value_is_none() {
        let mut value = json!({"name": "alice", "role": "admin"});
        set_path(&mut value, "role", None);
        assert_eq!(value, json!({"name": "alice"}));
    }

    #[test]
    fn split_prefixed_path_separates_prefix_id_and_leaf() {
        assert_eq!(split_prefixed_path("entity:e1.metadata.tag"), Some(("entity", "e1", Some("metadata.tag"))));
        assert_eq!(split_prefixed_path("entity:e1"), Some(("entity", "e1", None)));
        assert_eq!(split_prefixed_path("bogus"), None);
    }

    #[test]
    fn diff_is_empty_for_identical_payloads() {
        let value = json!({"x": 1, "y": [1, 2, 3]});
        assert!(diff_payload(&value, &value).is_empty());
    }
}
