use serde_json::{Map, Value};

use crate::plugins::store::Snapshot;
use crate::services::ai::{ChatMessage, Role};

/// One top-level entry of a conversation snapshot.
#[derive(Debug, PartialEq)]
enum Entry {
    /// `{role, content}` written directly under the conversation.
    Flat(ChatMessage),
    /// Legacy shape: a mapping of messages one level down.
    Nested(Vec<ChatMessage>),
    Malformed,
}

fn decode_message(map: &Map<String, Value>) -> Option<ChatMessage> {
    let role = map.get("role")?.as_str().and_then(Role::parse)?;
    let content = map.get("content")?.as_str()?;
    Some(ChatMessage::new(role, content))
}

fn decode_entry(value: &Value) -> Entry {
    let Some(map) = value.as_object() else {
        return Entry::Malformed;
    };
    if let Some(message) = decode_message(map) {
        return Entry::Flat(message);
    }

    let mut children = Vec::with_capacity(map.len());
    for (key, child) in map {
        match child.as_object().and_then(decode_message) {
            Some(message) => children.push(message),
            None => log::debug!("Skipping malformed nested entry {}", key),
        }
    }
    Entry::Nested(children)
}

/// Stored history in store iteration order. Stored `system` entries are
/// dropped; the fixed instruction replaces them.
pub fn history(snapshot: &Snapshot) -> Vec<ChatMessage> {
    let Some(entries) = snapshot.value().and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match decode_entry(value) {
            Entry::Flat(message) => out.push(message),
            Entry::Nested(children) => out.extend(children),
            Entry::Malformed => log::debug!("Skipping malformed entry {}", key),
        }
    }
    out.retain(|m| m.role != Role::System);
    out
}

/// The message list sent to the completion API: system instruction first.
pub fn assemble(snapshot: &Snapshot, system_prompt: &str) -> Vec<ChatMessage> {
    let history = history(snapshot);
    let mut out = Vec::with_capacity(history.len() + 1);
    out.push(ChatMessage::system(system_prompt));
    out.extend(history);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SYSTEM: &str = "sys";

    fn snap(value: Value) -> Snapshot {
        Snapshot::new(Some(value))
    }

    #[test]
    fn test_absent_snapshot_is_only_system() {
        assert_eq!(assemble(&Snapshot::absent(), SYSTEM), vec![ChatMessage::system(SYSTEM)]);
        assert!(history(&snap(json!({}))).is_empty());
    }

    #[test]
    fn test_single_user_message() {
        let snapshot = snap(json!({"-k1": {"role": "user", "content": "hello"}}));
        assert_eq!(
            assemble(&snapshot, SYSTEM),
            vec![ChatMessage::system(SYSTEM), ChatMessage::user("hello")]
        );
    }

    #[test]
    fn test_mixed_nested_and_flat() {
        let snapshot = snap(json!({
            "a": {"x": {"role": "user", "content": "hi"}},
            "b": {"role": "assistant", "content": "yo"}
        }));
        assert_eq!(
            history(&snapshot),
            vec![ChatMessage::user("hi"), ChatMessage::assistant("yo")]
        );
    }

    #[test]
    fn test_flat_keeps_insertion_order() {
        // Keys deliberately not in sorted order.
        let snapshot = snap(json!({
            "z": {"role": "user", "content": "1"},
            "a": {"role": "assistant", "content": "2"},
            "m": {"role": "user", "content": "3"}
        }));
        let contents: Vec<_> = assemble(&snapshot, SYSTEM)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec![SYSTEM, "1", "2", "3"]);
    }

    #[test]
    fn test_nested_outer_then_inner_each_leaf_once() {
        let snapshot = snap(json!({
            "o1": {
                "i1": {"role": "user", "content": "a"},
                "i2": {"role": "assistant", "content": "b"}
            },
            "o2": {"i1": {"role": "user", "content": "c"}}
        }));
        let contents: Vec<_> = history(&snapshot).into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let snapshot = snap(json!({
            "a": "just a string",
            "b": {"role": "user"},
            "c": {"role": "wizard", "content": "abracadabra"},
            "d": {"role": "user", "content": 42},
            "e": {"x": {"deeper": {"role": "user", "content": "too deep"}}},
            "f": {"role": "user", "content": "kept"}
        }));
        assert_eq!(history(&snapshot), vec![ChatMessage::user("kept")]);
    }

    #[test]
    fn test_partial_message_entry_still_yields_children() {
        let snapshot = snap(json!({
            "a": {
                "role": "user",
                "x": {"role": "user", "content": "hi"}
            },
            "b": {
                "content": "stray",
                "y": {"role": "assistant", "content": "yo"}
            }
        }));
        assert_eq!(
            history(&snapshot),
            vec![ChatMessage::user("hi"), ChatMessage::assistant("yo")]
        );
    }

    #[test]
    fn test_stored_system_entries_are_replaced() {
        let snapshot = snap(json!({
            "a": {"role": "system", "content": "old instruction"},
            "b": {"role": "user", "content": "hi"}
        }));
        assert_eq!(
            assemble(&snapshot, SYSTEM),
            vec![ChatMessage::system(SYSTEM), ChatMessage::user("hi")]
        );
    }
}
