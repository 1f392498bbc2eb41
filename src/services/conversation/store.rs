use std::sync::Arc;

use crate::plugins::auth::SessionHandle;
use crate::plugins::store::{Snapshot, StoreError, StorePath, Subscription, TreeStore};
use crate::services::ai::ChatMessage;

use super::Scope;

const USERS_ROOT: &str = "users";
const CONVERSATIONS: &str = "conversations";
const SHARED_ROOT: &str = "conversation";

/// Conversation-scoped view over a `TreeStore`.
///
/// Paths are resolved from the current session on every call, so a sign-out
/// immediately stops per-user reads and writes.
#[derive(Clone)]
pub struct ConversationStore {
    tree: Arc<dyn TreeStore>,
    session: SessionHandle,
    scope: Scope,
}

impl ConversationStore {
    pub fn new(tree: Arc<dyn TreeStore>, session: SessionHandle, scope: Scope) -> Self {
        Self {
            tree,
            session,
            scope,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn backend(&self) -> &'static str {
        self.tree.backend()
    }

    /// Whether per-user operations would currently be accepted.
    pub fn is_available(&self) -> bool {
        self.scope == Scope::Shared || self.session.is_signed_in()
    }

    /// Uid the paths are currently resolved against (`None` in shared scope).
    pub fn owner(&self) -> Option<String> {
        match self.scope {
            Scope::PerUser => self.session.uid(),
            Scope::Shared => None,
        }
    }

    fn threads_root(&self) -> Result<StorePath, StoreError> {
        match self.scope {
            Scope::Shared => StorePath::root().child(SHARED_ROOT),
            Scope::PerUser => {
                let uid = self
                    .session
                    .uid()
                    .ok_or_else(|| StoreError::unavailable("Not signed in"))?;
                StorePath::root()
                    .child(USERS_ROOT)?
                    .child(&uid)?
                    .child(CONVERSATIONS)
            }
        }
    }

    pub fn conversation_path(&self, conversation_id: &str) -> Result<StorePath, StoreError> {
        self.threads_root()?.child(conversation_id)
    }

    /// Append one message; returns the generated message key.
    pub async fn append(
        &self,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<String, StoreError> {
        let path = self.conversation_path(conversation_id)?;
        let value = serde_json::to_value(message)?;
        self.tree.push(&path, value).await
    }

    pub async fn read_all(&self, conversation_id: &str) -> Result<Snapshot, StoreError> {
        let path = self.conversation_path(conversation_id)?;
        self.tree.get(&path).await
    }

    pub async fn subscribe(&self, conversation_id: &str) -> Result<Subscription, StoreError> {
        let path = self.conversation_path(conversation_id)?;
        self.tree.subscribe(&path).await
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        let path = self.conversation_path(conversation_id)?;
        self.tree.remove(&path).await
    }

    /// Conversation ids under the current scope, in store order.
    pub async fn list_conversations(&self) -> Result<Vec<String>, StoreError> {
        let root = self.threads_root()?;
        Ok(self.tree.get(&root).await?.keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::auth::test_session;
    use crate::plugins::store::MemoryTree;
    use serde_json::json;

    fn store(scope: Scope) -> (Arc<MemoryTree>, SessionHandle, ConversationStore) {
        let tree = Arc::new(MemoryTree::new());
        let session = SessionHandle::new();
        let store = ConversationStore::new(tree.clone(), session.clone(), scope);
        (tree, session, store)
    }

    #[tokio::test]
    async fn test_per_user_requires_session() {
        let (_tree, session, store) = store(Scope::PerUser);
        let err = store
            .append("c1", &ChatMessage::user("hi"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(store.read_all("c1").await.unwrap_err().is_unavailable());
        assert!(!store.is_available());

        session.replace(Some(test_session("u1")));
        assert!(store.is_available());
        assert_eq!(
            store.conversation_path("c1").unwrap().to_string(),
            "users/u1/conversations/c1"
        );
    }

    #[tokio::test]
    async fn test_append_then_read_back() {
        let (tree, session, store) = store(Scope::PerUser);
        session.replace(Some(test_session("u1")));

        store.append("c1", &ChatMessage::user("hello")).await.unwrap();
        store.append("c1", &ChatMessage::assistant("hi!")).await.unwrap();

        let snapshot = store.read_all("c1").await.unwrap();
        let values: Vec<_> = snapshot
            .value()
            .and_then(|v| v.as_object())
            .unwrap()
            .values()
            .cloned()
            .collect();
        assert_eq!(
            values,
            vec![
                json!({"role": "user", "content": "hello"}),
                json!({"role": "assistant", "content": "hi!"})
            ]
        );

        let raw = tree
            .get(&StorePath::parse("users/u1/conversations/c1").unwrap())
            .await
            .unwrap();
        assert_eq!(raw, snapshot);
    }

    #[tokio::test]
    async fn test_shared_scope_layout() {
        let (_tree, _session, store) = store(Scope::Shared);
        store.append("c9", &ChatMessage::user("hey")).await.unwrap();
        assert_eq!(store.conversation_path("c9").unwrap().to_string(), "conversation/c9");
        assert_eq!(store.list_conversations().await.unwrap(), vec!["c9".to_string()]);
        assert_eq!(store.owner(), None);
    }

    #[tokio::test]
    async fn test_users_do_not_see_each_other() {
        let (_tree, session, store) = store(Scope::PerUser);
        session.replace(Some(test_session("u1")));
        store.append("c1", &ChatMessage::user("mine")).await.unwrap();

        session.replace(Some(test_session("u2")));
        assert!(!store.read_all("c1").await.unwrap().exists());
        assert!(store.list_conversations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_thread() {
        let (_tree, session, store) = store(Scope::PerUser);
        session.replace(Some(test_session("u1")));
        store.append("c1", &ChatMessage::user("bye")).await.unwrap();
        store.delete("c1").await.unwrap();
        assert!(!store.read_all("c1").await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_subscription_sees_appends() {
        let (_tree, session, store) = store(Scope::PerUser);
        session.replace(Some(test_session("u1")));
        let mut sub = store.subscribe("c1").await.unwrap();
        assert!(!sub.changed().await.unwrap().exists());

        store.append("c1", &ChatMessage::user("ping")).await.unwrap();
        let snapshot = sub.changed().await.unwrap();
        assert_eq!(snapshot.keys().len(), 1);
    }
}
