//! In-place edits on a JSON tree addressed by path segments.
//!
//! Shared by the in-memory backend, the libSQL row assembler and the realtime
//! mirror that applies streamed `put`/`patch` events.

use serde_json::{Map, Value};

pub(crate) fn get_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Replace the value at `segments`, creating intermediate objects.
/// A null value removes the node instead.
pub(crate) fn set_at(root: &mut Value, segments: &[String], value: Value) {
    if value.is_null() {
        remove_at(root, segments);
        return;
    }

    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.clone(), value);
}

/// Merge each child of `children` into the node at `segments`.
pub(crate) fn patch_at(root: &mut Value, segments: &[String], children: Map<String, Value>) {
    let mut path = segments.to_vec();
    for (key, value) in children {
        path.push(key);
        set_at(root, &path, value);
        path.pop();
    }
}

/// Remove the node at `segments` and prune parents left empty.
pub(crate) fn remove_at(root: &mut Value, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        let had_value = !root.is_null();
        *root = Value::Null;
        return had_value;
    };

    let Some(map) = root.as_object_mut() else {
        return false;
    };

    let removed = if rest.is_empty() {
        map.shift_remove(first).is_some()
    } else {
        match map.get_mut(first) {
            Some(child) => {
                let removed = remove_at(child, rest);
                if is_empty_node(child) {
                    map.shift_remove(first);
                }
                removed
            }
            None => false,
        }
    };

    if map.is_empty() {
        *root = Value::Null;
    }
    removed
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    match node {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(raw: &str) -> Vec<String> {
        raw.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_set_creates_parents_in_order() {
        let mut root = Value::Null;
        set_at(&mut root, &segs("c/k2"), json!({"role": "user", "content": "b"}));
        set_at(&mut root, &segs("c/k1"), json!({"role": "user", "content": "a"}));
        let keys: Vec<_> = get_at(&root, &segs("c"))
            .and_then(|v| v.as_object())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        assert_eq!(keys, vec!["k2", "k1"]);
    }

    #[test]
    fn test_set_over_scalar_replaces_it() {
        let mut root = json!({"a": 5});
        set_at(&mut root, &segs("a/b"), json!(1));
        assert_eq!(root, json!({"a": {"b": 1}}));

        let mut root = json!("text");
        set_at(&mut root, &segs("x/y"), json!(true));
        assert_eq!(root, json!({"x": {"y": true}}));
    }

    #[test]
    fn test_remove_prunes_empty_parents() {
        let mut root = json!({"users": {"u1": {"c": {"k": 1}}}, "other": true});
        assert!(remove_at(&mut root, &segs("users/u1/c/k")));
        assert_eq!(root, json!({"other": true}));
        assert!(!remove_at(&mut root, &segs("users/u1")));
    }

    #[test]
    fn test_null_set_removes() {
        let mut root = json!({"a": {"b": 1}});
        set_at(&mut root, &segs("a/b"), Value::Null);
        assert!(root.is_null());
    }

    #[test]
    fn test_patch_merges_children() {
        let mut root = json!({"c": {"k1": {"role": "user", "content": "a"}}});
        let patch = json!({"k2": {"role": "assistant", "content": "b"}, "k1": null});
        patch_at(&mut root, &segs("c"), patch.as_object().cloned().unwrap());
        assert_eq!(root, json!({"c": {"k2": {"role": "assistant", "content": "b"}}}));
    }
}
