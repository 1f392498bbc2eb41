//! Realtime tree storage for conversations.
//!
//! Backends:
//! - `RealtimeTree`: the hosted realtime database (REST + event stream).
//! - `LocalTree`: libSQL file (or remote libSQL) fallback.
//! - `MemoryTree`: in-process, for tests and throwaway runs.
//!
//! The conversation-scoped adapter lives in `crate::services::conversation`.

mod error;
mod local;
mod memory;
mod push_id;
mod realtime;
mod sse;
mod tree;
mod types;
mod watch;

use async_trait::async_trait;
use serde_json::Value;

pub use error::StoreError;
pub use local::LocalTree;
pub use memory::MemoryTree;
pub use realtime::RealtimeTree;
pub use types::{Snapshot, StorePath};
pub use watch::Subscription;

/// Append / read / replace / delete / watch on a JSON tree addressed by path.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Append `value` under a freshly generated, time-ordered child key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    async fn get(&self, path: &StorePath) -> Result<Snapshot, StoreError>;

    /// Replace the subtree at `path`. A null value deletes it.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError>;

    fn backend(&self) -> &'static str;
}
