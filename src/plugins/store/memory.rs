use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::push_id::PushIdGenerator;
use super::tree;
use super::watch::{Subscription, Watchers};
use super::{Snapshot, StoreError, StorePath, TreeStore};

/// Process-local tree. Iteration order is insertion order.
#[derive(Default)]
pub struct MemoryTree {
    // NOTE: std Mutex is fine here, the lock is never held across `.await`.
    root: Mutex<Value>,
    ids: PushIdGenerator,
    watchers: Watchers,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let mut root = self
            .root
            .lock()
            .map_err(|_| StoreError::internal("Memory store lock poisoned"))?;
        tree::set_at(&mut root, path.segments(), value);
        self.watchers.notify_with(path, |watched| read_at(&root, watched));
        Ok(())
    }
}

fn read_at(root: &Value, path: &StorePath) -> Snapshot {
    Snapshot::new(tree::get_at(root, path.segments()).cloned())
}

#[async_trait]
impl TreeStore for MemoryTree {
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = self.ids.next_id();
        self.write(&path.child(&key)?, value)?;
        Ok(key)
    }

    async fn get(&self, path: &StorePath) -> Result<Snapshot, StoreError> {
        let root = self
            .root
            .lock()
            .map_err(|_| StoreError::internal("Memory store lock poisoned"))?;
        Ok(read_at(&root, path))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.write(path, value)
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.write(path, Value::Null)
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        // Register under the lock so no write slips between the read and the registration.
        let root = self
            .root
            .lock()
            .map_err(|_| StoreError::internal("Memory store lock poisoned"))?;
        Ok(self.watchers.register(path.clone(), read_at(&root, path)))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
