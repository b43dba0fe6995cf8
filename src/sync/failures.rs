//! Bounded log of per-item failures.

use crate::error::Result;
use crate::model::SourcePlatform;
use crate::storage::{KeyValueStoreExt, SharedStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store key of the failure log.
pub const FAILURES_KEY: &str = "failures";

/// Records kept; older ones fall off.
pub const MAX_FAILURES: usize = 50;

/// One failed item, with enough context to retry it by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub source: SourcePlatform,
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub reason: String,
    pub at: DateTime<Utc>,
    /// Consecutive failures of this item.
    #[serde(default = "one")]
    pub attempts: u32,
}

fn one() -> u32 {
    1
}

/// Most recent first, at most `capacity` records.
#[derive(Clone)]
pub struct FailureLog {
    store: SharedStore,
    capacity: usize,
}

impl FailureLog {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self::with_capacity(store, MAX_FAILURES)
    }

    #[must_use]
    pub fn with_capacity(store: SharedStore, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    /// # Errors
    ///
    /// Store failures.
    pub fn list(&self) -> Result<Vec<FailureRecord>> {
        Ok(self
            .store
            .get_as::<Vec<FailureRecord>>(FAILURES_KEY)?
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// Store failures.
    pub fn get(&self, source: SourcePlatform, id: &str) -> Result<Option<FailureRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|r| r.source == source && r.id == id))
    }

    /// Log a failure. A repeat failure of the same item replaces its
    /// record and bumps `attempts`.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn record(
        &self,
        source: SourcePlatform,
        id: &str,
        title: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<FailureRecord> {
        let mut records = self.list()?;
        let previous = records
            .iter()
            .position(|r| r.source == source && r.id == id)
            .map(|i| records.remove(i));

        let record = FailureRecord {
            source,
            id: id.to_string(),
            title: title.to_string(),
            reason: reason.to_string(),
            at,
            attempts: previous.map_or(1, |p| p.attempts.saturating_add(1)),
        };
        records.insert(0, record.clone());
        records.truncate(self.capacity);
        self.store.set_one(FAILURES_KEY, &records)?;
        Ok(record)
    }

    /// Drop the record for one item. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn remove(&self, source: SourcePlatform, id: &str) -> Result<bool> {
        let mut records = self.list()?;
        let before = records.len();
        records.retain(|r| !(r.source == source && r.id == id));
        if records.len() == before {
            return Ok(false);
        }
        self.save(&records)?;
        Ok(true)
    }

    /// Drop every record. Returns how many there were.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn clear(&self) -> Result<usize> {
        let count = self.list()?.len();
        self.store.remove(&[FAILURES_KEY])?;
        Ok(count)
    }

    fn save(&self, records: &[FailureRecord]) -> Result<()> {
        if records.is_empty() {
            self.store.remove(&[FAILURES_KEY])
        } else {
            self.store.set_one(FAILURES_KEY, records)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_most_recent_first_and_bounded() {
        let log = FailureLog::with_capacity(Arc::new(MemoryStore::new()), 3);
        for i in 0..5 {
            log.record(SourcePlatform::ChatGpt, &format!("t{i}"), "", "TRANSPORT_ERROR", at(i))
                .unwrap();
        }
        let ids: Vec<_> = log.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["t4", "t3", "t2"]);
    }

    #[test]
    fn test_repeat_failure_bumps_attempts() {
        let log = FailureLog::new(Arc::new(MemoryStore::new()));
        log.record(SourcePlatform::Claude, "c", "Chat", "first", at(1)).unwrap();
        log.record(SourcePlatform::Claude, "other", "", "x", at(2)).unwrap();
        let record = log.record(SourcePlatform::Claude, "c", "Chat", "second", at(3)).unwrap();

        assert_eq!(record.attempts, 2);
        let records = log.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reason, "second");
        assert_eq!(
            log.get(SourcePlatform::Claude, "c").unwrap().map(|r| r.attempts),
            Some(2)
        );
        assert!(log.get(SourcePlatform::Perplexity, "c").unwrap().is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = Arc::new(MemoryStore::new());
        let log = FailureLog::new(store.clone());
        log.record(SourcePlatform::Perplexity, "a", "", "x", at(1)).unwrap();
        log.record(SourcePlatform::Perplexity, "b", "", "y", at(2)).unwrap();

        assert!(log.remove(SourcePlatform::Perplexity, "a").unwrap());
        assert!(!log.remove(SourcePlatform::Perplexity, "a").unwrap());
        assert_eq!(log.clear().unwrap(), 1);
        assert!(log.list().unwrap().is_empty());
        assert!(store.keys().is_empty());
    }
}
