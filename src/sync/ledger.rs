//! Record of what has been exported.
//!
//! Keys:
//! - `exported:<source>`: array of exported thread ids
//! - `fingerprint:<source>:<id>`: fingerprint at the last export
//! - `page:<source>:<id>`: id of the page written for the thread
//! - `activity:<source>`: id → listed activity time at the last check

use crate::error::Result;
use crate::model::SourcePlatform;
use crate::normalize::Fingerprint;
use crate::storage::{KeyValueStoreExt, SharedStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

fn exported_key(platform: SourcePlatform) -> String {
    format!("exported:{}", platform.as_str())
}

fn fingerprint_key(platform: SourcePlatform, id: &str) -> String {
    format!("fingerprint:{}:{id}", platform.as_str())
}

fn page_key(platform: SourcePlatform, id: &str) -> String {
    format!("page:{}:{id}", platform.as_str())
}

fn activity_key(platform: SourcePlatform) -> String {
    format!("activity:{}", platform.as_str())
}

#[derive(Clone)]
pub struct ExportLedger {
    store: SharedStore,
}

impl ExportLedger {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Store failures.
    pub fn exported_ids(&self, platform: SourcePlatform) -> Result<HashSet<String>> {
        Ok(self
            .store
            .get_as::<Vec<String>>(&exported_key(platform))?
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    /// # Errors
    ///
    /// Store failures.
    pub fn is_exported(&self, platform: SourcePlatform, id: &str) -> Result<bool> {
        Ok(self.exported_ids(platform)?.contains(id))
    }

    /// # Errors
    ///
    /// Store failures.
    pub fn fingerprint(&self, platform: SourcePlatform, id: &str) -> Result<Option<Fingerprint>> {
        self.store.get_as(&fingerprint_key(platform, id))
    }

    /// # Errors
    ///
    /// Store failures.
    pub fn page_for(&self, platform: SourcePlatform, id: &str) -> Result<Option<String>> {
        self.store.get_as(&page_key(platform, id))
    }

    /// Listed activity time of each thread when it was last exported or
    /// found unchanged.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn checked_activity(
        &self,
        platform: SourcePlatform,
    ) -> Result<HashMap<String, DateTime<Utc>>> {
        Ok(self
            .store
            .get_as::<HashMap<String, DateTime<Utc>>>(&activity_key(platform))?
            .unwrap_or_default())
    }

    /// Remember the activity time a thread was last checked at.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn record_activity(
        &self,
        platform: SourcePlatform,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut checked: BTreeMap<String, DateTime<Utc>> =
            self.checked_activity(platform)?.into_iter().collect();
        checked.insert(id.to_string(), at);
        self.store.set_one(&activity_key(platform), &checked)
    }

    /// Record a successful export: id, fingerprint and page in one write.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn mark_exported(
        &self,
        platform: SourcePlatform,
        id: &str,
        fingerprint: &Fingerprint,
        page_id: &str,
    ) -> Result<()> {
        let mut ids: BTreeSet<String> = self.exported_ids(platform)?.into_iter().collect();
        ids.insert(id.to_string());

        let mut entries = HashMap::new();
        entries.insert(exported_key(platform), serde_json::to_value(ids)?);
        entries.insert(
            fingerprint_key(platform, id),
            Value::String(fingerprint.as_str().to_string()),
        );
        entries.insert(page_key(platform, id), Value::String(page_id.to_string()));
        self.store.set(entries)
    }
}
