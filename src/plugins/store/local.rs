//! Conversation tree backed by libSQL (Turso).
//!
//! Each write is one row holding a JSON value at a slash path. Reads rebuild
//! the requested subtree from its rows in write order, so children come back
//! in insertion order. Works against a local file or a remote libSQL database.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use libsql::{params, Builder, Connection, Database};
use serde_json::Value;
use tokio::sync::Mutex;

use super::push_id::PushIdGenerator;
use super::tree;
use super::watch::{Subscription, Watchers};
use super::{Snapshot, StoreError, StorePath, TreeStore};

const LOCAL_DB_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DbMode {
    Remote,
    Local,
}

pub struct LocalTree {
    _db: Database,
    db_mode: DbMode,
    /// Single connection; serializes writes and keeps `:memory:` databases coherent.
    conn: Mutex<Connection>,
    ids: PushIdGenerator,
    watchers: Watchers,
}

fn is_db_locked_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("database is locked") || lower.contains("sqlite_busy") || lower.contains("database is busy")
}

async fn retry_db_locked<T, Fut, F>(mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = Duration::from_millis(25);
    for attempt in 0..5 {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= 4 || !is_db_locked_error(err.message()) {
                    return Err(err);
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(400));
            }
        }
    }
    Err(StoreError::database("Store retry exhausted"))
}

impl LocalTree {
    /// Open (or create) a local database file. `":memory:"` gives a throwaway tree.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        log::info!("Conversation store: using local libSQL file {}", path_str);
        let db = Builder::new_local(path_str).build().await?;
        Self::from_database(db, DbMode::Local).await
    }

    pub async fn open_remote(url: String, token: String) -> Result<Self, StoreError> {
        log::info!("Conversation store: using remote libSQL");
        let db = Builder::new_remote(url, token).build().await?;
        Self::from_database(db, DbMode::Remote).await
    }

    async fn from_database(db: Database, db_mode: DbMode) -> Result<Self, StoreError> {
        let conn = db.connect()?;
        if db_mode == DbMode::Local {
            let _ = conn.busy_timeout(LOCAL_DB_BUSY_TIMEOUT);
            let _ = conn.query("PRAGMA journal_mode = WAL;", ()).await;
            let _ = conn.query("PRAGMA synchronous = NORMAL;", ()).await;
        }
        let store = Self {
            _db: db,
            db_mode,
            conn: Mutex::new(conn),
            ids: PushIdGenerator::default(),
            watchers: Watchers::default(),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (\n  seq INTEGER PRIMARY KEY AUTOINCREMENT,\n  path TEXT NOT NULL UNIQUE,\n  value TEXT NOT NULL\n);",
            (),
        )
        .await?;
        log::debug!("Conversation store schema ready ({:?})", self.db_mode);
        Ok(())
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let encoded = if value.is_null() {
            None
        } else {
            Some(serde_json::to_string(&value)?)
        };

        retry_db_locked(|| async {
            strip_from_ancestors(&conn, path).await?;
            delete_subtree(&conn, path).await?;
            if let Some(encoded) = encoded.as_deref() {
                conn.execute(
                    "INSERT INTO nodes (path, value) VALUES (?1, ?2);",
                    params![path.to_string(), encoded],
                )
                .await?;
            }
            Ok(())
        })
        .await?;

        for (watched, tx) in self.watchers.affected(path) {
            match read_subtree(&conn, &watched).await {
                Ok(snapshot) => {
                    let _ = tx.send(snapshot);
                }
                Err(err) => log::warn!("Store notify read failed for {}: {}", watched, err),
            }
        }
        Ok(())
    }
}

/// Every row path that is a proper ancestor of `path`, root first.
fn ancestor_paths(path: &StorePath) -> Vec<StorePath> {
    let mut out = Vec::new();
    let mut current = path.parent();
    while let Some(p) = current {
        current = p.parent();
        out.push(p);
    }
    out.reverse();
    out
}

fn subtree_prefix(path: &StorePath) -> (String, i64) {
    let prefix = format!("{path}/");
    let len = prefix.chars().count() as i64;
    (prefix, len)
}

async fn delete_subtree(conn: &Connection, path: &StorePath) -> Result<(), StoreError> {
    if path.is_root() {
        conn.execute("DELETE FROM nodes;", ()).await?;
        return Ok(());
    }
    let (prefix, len) = subtree_prefix(path);
    conn.execute(
        "DELETE FROM nodes WHERE path = ?1 OR substr(path, 1, ?3) = ?2;",
        params![path.to_string(), prefix, len],
    )
    .await?;
    Ok(())
}

/// Remove `path` from rows stored at its ancestors, so the new value is the only one left.
async fn strip_from_ancestors(conn: &Connection, path: &StorePath) -> Result<(), StoreError> {
    for ancestor in ancestor_paths(path) {
        let mut rows = conn
            .query(
                "SELECT value FROM nodes WHERE path = ?1 LIMIT 1;",
                params![ancestor.to_string()],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            continue;
        };
        let raw: String = row.get(0)?;
        let mut value: Value = serde_json::from_str(&raw)?;
        let Some(relative) = ancestor.relative(path) else {
            continue;
        };
        if !tree::remove_at(&mut value, relative) {
            continue;
        }
        if value.is_null() {
            conn.execute(
                "DELETE FROM nodes WHERE path = ?1;",
                params![ancestor.to_string()],
            )
            .await?;
        } else {
            conn.execute(
                "UPDATE nodes SET value = ?2 WHERE path = ?1;",
                params![ancestor.to_string(), serde_json::to_string(&value)?],
            )
            .await?;
        }
    }
    Ok(())
}

async fn read_subtree(conn: &Connection, path: &StorePath) -> Result<Snapshot, StoreError> {
    let mut rows = if path.is_root() {
        conn.query("SELECT path, value FROM nodes ORDER BY seq ASC;", ())
            .await?
    } else {
        let (prefix, len) = subtree_prefix(path);
        // Rows at the path, below it, or at an ancestor that may embed it.
        conn.query(
            "SELECT path, value FROM nodes\n  WHERE path = ?1\n     OR path = ''\n     OR substr(path, 1, ?3) = ?2\n     OR substr(?1, 1, length(path) + 1) = path || '/'\n  ORDER BY seq ASC;",
            params![path.to_string(), prefix, len],
        )
        .await?
    };

    let mut root = Value::Null;
    while let Some(row) = rows.next().await? {
        let row_path: String = row.get(0)?;
        let raw: String = row.get(1)?;
        let row_path = StorePath::parse(&row_path)?;
        let value: Value = serde_json::from_str(&raw)?;

        if let Some(relative) = row_path.relative(path) {
            // Ancestor (or exact) row: take the part that lives at `path`.
            root = tree::get_at(&value, relative).cloned().unwrap_or(Value::Null);
        } else if let Some(relative) = path.relative(&row_path) {
            tree::set_at(&mut root, relative, value);
        }
    }
    Ok(Snapshot::new(Some(root)))
}

#[async_trait]
impl TreeStore for LocalTree {
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = self.ids.next_id();
        self.write(&path.child(&key)?, value).await?;
        Ok(key)
    }

    async fn get(&self, path: &StorePath) -> Result<Snapshot, StoreError> {
        let conn = self.conn.lock().await;
        retry_db_locked(|| read_subtree(&conn, path)).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.write(path, value).await
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.write(path, Value::Null).await
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let conn = self.conn.lock().await;
        let initial = read_subtree(&conn, path).await?;
        Ok(self.watchers.register(path.clone(), initial))
    }

    fn backend(&self) -> &'static str {
        match self.db_mode {
            DbMode::Remote => "libsql-remote",
            DbMode::Local => "libsql",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    async fn open_temp() -> (tempfile::TempDir, LocalTree) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalTree::open(dir.path().join("history.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_push_and_read_back_in_order() {
        let (_dir, store) = open_temp().await;
        let conv = path("users/u1/conversations/c1");
        let k1 = store.push(&conv, json!({"role": "user", "content": "a"})).await.unwrap();
        let k2 = store.push(&conv, json!({"role": "assistant", "content": "b"})).await.unwrap();

        let snap = store.get(&conv).await.unwrap();
        assert_eq!(snap.keys(), vec![k1.clone(), k2]);
        assert_eq!(snap.child(&k1).value(), Some(&json!({"role": "user", "content": "a"})));

        let parent = store.get(&path("users/u1/conversations")).await.unwrap();
        assert_eq!(parent.keys(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_read_inside_ancestor_row() {
        let (_dir, store) = open_temp().await;
        store
            .set(&path("conversation"), json!({"c1": {"k": {"role": "user", "content": "hi"}}}))
            .await
            .unwrap();
        let snap = store.get(&path("conversation/c1/k")).await.unwrap();
        assert_eq!(snap.value(), Some(&json!({"role": "user", "content": "hi"})));

        store.remove(&path("conversation/c1/k")).await.unwrap();
        assert!(!store.get(&path("conversation")).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_remove_subtree_keeps_similar_keys() {
        let (_dir, store) = open_temp().await;
        store.set(&path("a_b/x"), json!(1)).await.unwrap();
        store.set(&path("aXb/x"), json!(2)).await.unwrap();
        store.remove(&path("a_b")).await.unwrap();
        assert!(!store.get(&path("a_b")).await.unwrap().exists());
        assert_eq!(store.get(&path("aXb/x")).await.unwrap().value(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_subscribe_sees_writes() {
        let (_dir, store) = open_temp().await;
        let conv = path("conversation/c1");
        let mut sub = store.subscribe(&conv).await.unwrap();
        assert!(!sub.changed().await.unwrap().exists());
        store.push(&conv, json!({"role": "user", "content": "a"})).await.unwrap();
        assert_eq!(sub.changed().await.unwrap().keys().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("history.db");
        let conv = path("conversation/c1");
        {
            let store = LocalTree::open(&file).await.unwrap();
            store.push(&conv, json!({"role": "user", "content": "a"})).await.unwrap();
        }
        let store = LocalTree::open(&file).await.unwrap();
        assert_eq!(store.get(&conv).await.unwrap().keys().len(), 1);
    }
}
