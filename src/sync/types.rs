//! Options and reports of sync cycles.

use crate::model::{Checkpoint, SourcePlatform};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Failures of one item after which automatic cycles leave it to
/// `sync retry`.
pub const MAX_AUTO_ATTEMPTS: u32 = 3;

/// Per-run overrides of the configured cycle policy.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Sources to sync; `None` means every registered source.
    pub sources: Option<Vec<SourcePlatform>>,
    /// Re-export even when the fingerprint is unchanged.
    pub force: bool,
    /// Cap on items per source for this cycle.
    pub max_items: Option<usize>,
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Exported {
        page_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        calls: usize,
        blocks: usize,
        /// Entries came from the rendered document.
        degraded: bool,
    },
    /// Fingerprint matched the last export; nothing was written.
    Unchanged,
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub source: SourcePlatform,
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemResult {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed { .. })
    }
}

/// Result of syncing one source within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: SourcePlatform,
    /// Threads returned by the listing.
    pub listed: usize,
    /// Threads left after the checkpoint and ledger filters.
    pub candidates: usize,
    pub items: Vec<ItemResult>,
    /// Candidates left for the next cycle.
    pub backlog: usize,
    pub checkpoint: Checkpoint,
    /// Listing failure; the checkpoint was not moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    pub(crate) fn new(source: SourcePlatform, checkpoint: Checkpoint) -> Self {
        Self {
            source,
            listed: 0,
            candidates: 0,
            items: Vec::new(),
            backlog: 0,
            checkpoint,
            error: None,
        }
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    #[must_use]
    pub fn exported(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Exported { .. }))
    }

    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Unchanged))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    #[must_use]
    pub fn exported(&self) -> usize {
        self.sources.iter().map(SourceReport::exported).sum()
    }

    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.sources.iter().map(SourceReport::unchanged).sum()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.sources.iter().map(SourceReport::failed).sum()
    }
}

/// Result of a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle held the lock; nothing ran.
    Skipped,
    Completed(CycleReport),
}

/// Snapshot of the engine for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineState {
    pub running: bool,
    pub sources: Vec<SourceState>,
    pub failures: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceState {
    pub source: SourcePlatform,
    pub checkpoint: Checkpoint,
    pub exported: usize,
}
