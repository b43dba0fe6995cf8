//! Persistent key-value storage.
//!
//! Checkpoints, the exported-id ledger, fingerprints, the failure log and
//! dispatch bookkeeping are flat key → JSON values behind
//! [`KeyValueStore`].
//!
//! # Submodules
//!
//! - [`memory`] - In-process store (tests, dry runs)
//! - [`schema`] - SQLite schema
//! - [`sqlite`] - SQLite-backed store

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared store handle.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Flat key → JSON store.
pub trait KeyValueStore: Send + Sync {
    /// Values for the requested keys; missing keys are absent from the map.
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Write all entries atomically.
    fn set(&self, entries: HashMap<String, Value>) -> Result<()>;

    fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Typed single-key helpers over [`KeyValueStore`].
pub trait KeyValueStoreExt {
    fn get_one(&self, key: &str) -> Result<Option<Value>>;

    /// Read and deserialize one key.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

    fn set_one<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {
    fn get_one(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(&[key])?.remove(key))
    }

    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_one(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_one<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), serde_json::to_value(value)?);
        self.set(entries)
    }
}
