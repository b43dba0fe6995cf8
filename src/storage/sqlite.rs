//! SQLite-backed key-value store.

use crate::error::{Error, Result};
use crate::storage::KeyValueStore;
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Key-value store persisted in a single SQLite table.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path, creating its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // `sync watch` and a manual `sync run` may share the file.
        conn.busy_timeout(BUSY_TIMEOUT)?;

        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("sqlite connection lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let mut out = HashMap::new();
        for key in keys {
            let raw: Option<String> = stmt
                .query_row(params![key], |row| row.get(0))
                .optional()?;
            if let Some(raw) = raw {
                out.insert((*key).to_string(), serde_json::from_str(&raw)?);
            }
        }
        Ok(out)
    }

    fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let mut conn = self.conn()?;
        let now = chrono::Utc::now().timestamp_millis();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )?;
            for (key, value) in &entries {
                stmt.execute(params![key, value.to_string(), now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
            for key in keys {
                stmt.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValueStoreExt;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("threadsync.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set_one("checkpoint:claude", &json!({"last_seen_id": "c1"}))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let value = store.get_one("checkpoint:claude").unwrap().unwrap();
        assert_eq!(value["last_seen_id"], "c1");
    }

    #[test]
    fn test_set_overwrites_and_remove_deletes() {
        let store = SqliteStore::open_memory().unwrap();
        store.set_one("k", &1).unwrap();
        store.set_one("k", &2).unwrap();
        assert_eq!(store.get_as::<i32>("k").unwrap(), Some(2));

        store.remove(&["k", "never-set"]).unwrap();
        assert!(store.get(&["k"]).unwrap().is_empty());
    }
}
