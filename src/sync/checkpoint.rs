//! Persisted per-source checkpoints.

use crate::error::Result;
use crate::model::{Checkpoint, SourcePlatform};
use crate::storage::{KeyValueStoreExt, SharedStore};
use chrono::{DateTime, Utc};

fn key(platform: SourcePlatform) -> String {
    format!("checkpoint:{}", platform.as_str())
}

/// Checkpoints under `checkpoint:<source>`.
#[derive(Clone)]
pub struct CheckpointStore {
    store: SharedStore,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Stored checkpoint, or the empty one for a never-synced source.
    ///
    /// # Errors
    ///
    /// Store failures and unreadable stored values.
    pub fn load(&self, platform: SourcePlatform) -> Result<Checkpoint> {
        Ok(self
            .store
            .get_as::<Checkpoint>(&key(platform))?
            .unwrap_or_default())
    }

    /// Move the watermark forward and persist it.
    ///
    /// An older `time` keeps the stored time; see [`Checkpoint::advance`].
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn advance(
        &self,
        platform: SourcePlatform,
        time: DateTime<Utc>,
        last_seen_id: Option<String>,
    ) -> Result<Checkpoint> {
        let mut checkpoint = self.load(platform)?;
        checkpoint.advance(time, last_seen_id);
        self.store.set_one(&key(platform), &checkpoint)?;
        Ok(checkpoint)
    }

    /// Record the newest processed id without moving the time.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn record_seen(&self, platform: SourcePlatform, last_seen_id: Option<String>) -> Result<Checkpoint> {
        let mut checkpoint = self.load(platform)?;
        if last_seen_id.is_some() {
            checkpoint.last_seen_id = last_seen_id;
            self.store.set_one(&key(platform), &checkpoint)?;
        }
        Ok(checkpoint)
    }

    /// Forget the checkpoint; the next cycle rescans the whole listing.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn reset(&self, platform: SourcePlatform) -> Result<()> {
        self.store.remove(&[&key(platform)])
    }
}
