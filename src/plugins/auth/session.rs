use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A signed-in user. Tokens are redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Shared "who is signed in" cell.
///
/// Readers never block; every change is broadcast as the new uid (or `None`
/// after sign-out) to receivers from `changes()`.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    current: ArcSwapOption<Session>,
    changes: watch::Sender<Option<String>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner {
                current: ArcSwapOption::empty(),
                changes,
            }),
        }
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.current.load_full()
    }

    pub fn uid(&self) -> Option<String> {
        self.inner.current.load().as_ref().map(|s| s.uid.clone())
    }

    pub fn id_token(&self) -> Option<String> {
        self.inner.current.load().as_ref().map(|s| s.id_token.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.current.load().is_some()
    }

    pub fn replace(&self, session: Option<Session>) {
        let uid = session.as_ref().map(|s| s.uid.clone());
        self.inner.current.store(session.map(Arc::new));
        self.inner.changes.send_if_modified(|current| {
            if *current == uid {
                return false;
            }
            *current = uid;
            true
        });
    }

    pub fn changes(&self) -> watch::Receiver<Option<String>> {
        self.inner.changes.subscribe()
    }
}

#[cfg(test)]
pub(crate) fn test_session(uid: &str) -> Session {
    Session {
        uid: uid.to_string(),
        id_token: format!("token-{uid}"),
        refresh_token: None,
        email: Some(format!("{uid}@example.com")),
        display_name: None,
    }
}
