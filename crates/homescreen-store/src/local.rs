use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::KeyedStore;
use crate::error::{Result, StoreError};
use crate::migrations;

pub const DEFAULT_NAMESPACE: &str = "homescreen_";

/// SQLite handle shared by every local store opened on the same file.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::sqlite)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(StoreError::sqlite)?;

        let db = Self::init(conn)?;
        info!("Local store opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::sqlite)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::run(&conn).map_err(StoreError::sqlite)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| StoreError::Backend {
            backend: "local",
            message: format!("DB lock poisoned: {}", e),
        })?;
        f(&conn).map_err(StoreError::sqlite)
    }
}

/// Device-local backend: every key is one row in a namespaced flat table.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
    namespace: String,
}

impl LocalStore {
    pub fn open(path: &Path, namespace: &str) -> Result<Self> {
        Ok(Self::with_database(Arc::new(Database::open(path)?), namespace))
    }

    pub fn in_memory(namespace: &str) -> Result<Self> {
        Ok(Self::with_database(Arc::new(Database::open_in_memory()?), namespace))
    }

    pub fn with_database(db: Arc<Database>, namespace: &str) -> Self {
        Self {
            db,
            namespace: namespace.to_string(),
        }
    }

    /// Run a SQLite closure off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &str) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let namespace = self.namespace.clone();
        tokio::task::spawn_blocking(move || db.with_conn(|conn| f(conn, &namespace)))
            .await
            .map_err(|e| StoreError::Backend {
                backend: "local",
                message: format!("spawn_blocking join error: {}", e),
            })?
    }
}

#[async_trait]
impl KeyedStore for LocalStore {
    fn backend_tag(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking(move |conn, ns| {
            let value = conn.query_row(
                "SELECT value FROM entries WHERE namespace = ?1 AND key = ?2",
                (ns, &key),
                |row| row.get(0),
            );
            match value {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |conn, ns| {
            conn.execute(
                "INSERT INTO entries (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, datetime('now'))
                 ON CONFLICT (namespace, key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                (ns, &key, &value),
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |conn, ns| {
            conn.execute(
                "DELETE FROM entries WHERE namespace = ?1 AND key = ?2",
                (ns, &key),
            )?;
            Ok(())
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        let keys = self
            .blocking(move |conn, ns| {
                let mut stmt =
                    conn.prepare("SELECT key FROM entries WHERE namespace = ?1 ORDER BY key")?;
                let keys = stmt
                    .query_map([ns], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(keys)
            })
            .await?;

        // Linear scan over the namespace, as the flat store has no key index by prefix.
        Ok(keys.into_iter().filter(|k| k.starts_with(&prefix)).collect())
    }

    async fn clear(&self) -> Result<()> {
        let removed = self
            .blocking(|conn, ns| conn.execute("DELETE FROM entries WHERE namespace = ?1", [ns]))
            .await?;
        debug!("Cleared {} local entries in namespace {}", removed, self.namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalStore {
        LocalStore::in_memory(DEFAULT_NAMESPACE).unwrap()
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        assert_eq!(store().get("user:nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_get_delete() {
        let s = store();
        let value = "{\"id\":\"u1\",\"displayName\":\"ゆい\"}";
        s.set("user:u1", value).await.unwrap();
        assert_eq!(s.get("user:u1").await.unwrap().as_deref(), Some(value));

        s.set("user:u1", "{}").await.unwrap();
        assert_eq!(s.get("user:u1").await.unwrap().as_deref(), Some("{}"));

        s.delete("user:u1").await.unwrap();
        assert_eq!(s.get("user:u1").await.unwrap(), None);
        // deleting again is fine
        s.delete("user:u1").await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let s = store();
        for key in ["screen:u1:current", "screen:u1:s1", "screen:u10:s2", "user:u1"] {
            s.set(key, "{}").await.unwrap();
        }
        assert_eq!(
            s.list("screen:u1:").await.unwrap(),
            vec!["screen:u1:current".to_string(), "screen:u1:s1".to_string()]
        );
        assert_eq!(s.list("notification:u1:").await.unwrap(), Vec::<String>::new());
        assert_eq!(s.list("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let a = LocalStore::with_database(db.clone(), "a_");
        let b = LocalStore::with_database(db, "b_");

        a.set("user:u1", "a").await.unwrap();
        b.set("user:u1", "b").await.unwrap();
        a.clear().await.unwrap();

        assert_eq!(a.get("user:u1").await.unwrap(), None);
        assert_eq!(b.get("user:u1").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let s = LocalStore::open(&path, DEFAULT_NAMESPACE).unwrap();
            s.set("action:u1:a1", "{\"x\":1}").await.unwrap();
        }
        let s = LocalStore::open(&path, DEFAULT_NAMESPACE).unwrap();
        assert_eq!(s.get("action:u1:a1").await.unwrap().as_deref(), Some("{\"x\":1}"));
    }
}
