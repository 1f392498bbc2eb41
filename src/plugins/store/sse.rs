//! Server-sent event decoding for the realtime tree's streaming endpoint.
//!
//! The stream emits `event:`/`data:` line pairs; `put` and `patch` carry a
//! JSON payload `{"path": "/relative", "data": ...}` that is applied to a
//! local mirror of the subscribed subtree.

use serde::Deserialize;
use serde_json::Value;

use super::tree;
use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub(crate) event: String,
    pub(crate) data: String,
}

/// Line-buffered decoder; feed it raw chunks as they arrive. Bytes are held
/// until a full line is available so multi-byte characters may span chunks.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = match String::from_utf8(raw) {
                Ok(line) => line.trim_end_matches(['\n', '\r']).to_string(),
                Err(e) => {
                    log::warn!("Skipping non-UTF-8 event line: {}", e);
                    continue;
                }
            };

            if line.is_empty() {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        frames
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RealtimeEvent {
    Put { path: Vec<String>, data: Value },
    Patch { path: Vec<String>, data: Value },
    KeepAlive,
    Cancel(String),
    AuthRevoked,
    Other(String),
}

impl RealtimeEvent {
    pub(crate) fn from_frame(frame: &SseFrame) -> Result<Self, StoreError> {
        let parse = |data: &str| -> Result<(Vec<String>, Value), StoreError> {
            let payload: PathData = serde_json::from_str(data)?;
            let path = payload
                .path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            Ok((path, payload.data))
        };

        match frame.event.as_str() {
            "put" => {
                let (path, data) = parse(&frame.data)?;
                Ok(Self::Put { path, data })
            }
            "patch" => {
                let (path, data) = parse(&frame.data)?;
                Ok(Self::Patch { path, data })
            }
            "keep-alive" => Ok(Self::KeepAlive),
            "cancel" => Ok(Self::Cancel(frame.data.clone())),
            "auth_revoked" => Ok(Self::AuthRevoked),
            other => Ok(Self::Other(other.to_string())),
        }
    }

    /// Apply a data event to the mirror. Returns true when the mirror changed.
    pub(crate) fn apply(self, mirror: &mut Value) -> bool {
        match self {
            Self::Put { path, data } => {
                tree::set_at(mirror, &path, data);
                true
            }
            Self::Patch { path, data } => match data {
                Value::Object(children) => {
                    tree::patch_at(mirror, &path, children);
                    true
                }
                other => {
                    log::warn!("Ignoring non-object patch payload: {}", other);
                    false
                }
            },
            _ => false,
        }
    }
}
