use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use super::StoreError;

/// Characters the realtime tree rejects inside a key.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];
const MAX_KEY_BYTES: usize = 768;

/// Slash-separated location inside the tree (`users/{uid}/conversations/{id}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: SmallVec<[String; 6]>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let mut path = Self::root();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        validate_key(key)?;
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &StorePath) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    /// A mutation at `other` changes the value seen at `self`.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// Segments of `other` below `self`, if `self` contains it.
    pub fn relative<'a>(&self, other: &'a StorePath) -> Option<&'a [String]> {
        if self.contains(other) {
            Some(&other.segments[self.segments.len()..])
        } else {
            None
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() {
        return Err(StoreError::invalid_input("Store key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StoreError::invalid_input("Store key is too long"));
    }
    if let Some(c) = key
        .chars()
        .find(|c| FORBIDDEN_KEY_CHARS.contains(c) || c.is_control())
    {
        return Err(StoreError::invalid_input(format!(
            "Store key {key:?} contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// Point-in-time read of a subtree. `None` means nothing is stored there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Option<Value>);

impl Snapshot {
    /// Null values and empty objects collapse to "absent", as the tree never stores them.
    pub fn new(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self(None),
            Some(Value::Object(map)) if map.is_empty() => Self(None),
            Some(value) => Self(Some(value)),
        }
    }

    pub fn absent() -> Self {
        Self(None)
    }

    pub fn exists(&self) -> bool {
        self.0.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    pub fn child(&self, key: &str) -> Snapshot {
        Snapshot::new(self.0.as_ref().and_then(|v| v.get(key)).cloned())
    }

    /// Keys of the top-level mapping, in store iteration order.
    pub fn keys(&self) -> Vec<String> {
        match self.0.as_ref() {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
