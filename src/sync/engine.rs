//! Incremental, checkpointed sync of sources into the page API.
//!
//! One cycle, per source:
//!
//! 1. Load the checkpoint
//! 2. List threads and keep those newer than the checkpoint and not yet
//!    exported
//! 3. Fetch, normalize and export the first `max_items_per_cycle` of them in
//!    sub-batches, pausing between sub-batches
//! 4. Advance the checkpoint
//!
//! The whole cycle runs under the [`SyncLock`]. Per-item failures go to the
//! [`FailureLog`] and the cycle moves on; store failures abort the cycle.

use crate::adapter::{AdapterRegistry, SourceAdapter};
use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::model::{Checkpoint, SourcePlatform, Thread, ThreadDetail};
use crate::normalize::{fingerprint, is_unchanged, normalize_detail};
use crate::storage::SharedStore;
use crate::sync::progress::{ProgressCallback, SyncProgress, emit};
use crate::sync::types::{
    CycleOutcome, CycleReport, EngineState, ItemOutcome, ItemResult, MAX_AUTO_ATTEMPTS,
    SourceReport, SourceState, SyncOptions,
};
use crate::sync::{CheckpointStore, ExportLedger, FailureLog, SyncLock};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Threads with activity after the checkpoint, newest first.
///
/// Threads without an activity time are kept; the ledger filter catches
/// repeats.
#[must_use]
pub fn filter_since(items: Vec<Thread>, checkpoint: &Checkpoint) -> Vec<Thread> {
    let mut fresh: Vec<Thread> = items
        .into_iter()
        .filter(|t| checkpoint.is_newer(t.last_activity))
        .collect();
    fresh.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    fresh
}

/// [`filter_since`], minus threads already exported.
#[must_use]
pub fn filter_new(
    items: Vec<Thread>,
    checkpoint: &Checkpoint,
    exported: &HashSet<String>,
) -> Vec<Thread> {
    filter_since(items, checkpoint)
        .into_iter()
        .filter(|t| !exported.contains(&t.id))
        .collect()
}

/// [`filter_since`], keeping exported threads only when their listed
/// activity moved past the time they were last checked at.
///
/// A thread with no recorded check is kept once; one without an activity
/// time is not re-checked.
#[must_use]
pub fn filter_changed(
    items: Vec<Thread>,
    checkpoint: &Checkpoint,
    exported: &HashSet<String>,
    checked: &HashMap<String, DateTime<Utc>>,
) -> Vec<Thread> {
    filter_since(items, checkpoint)
        .into_iter()
        .filter(|t| {
            if !exported.contains(&t.id) {
                return true;
            }
            match (t.last_activity, checked.get(&t.id)) {
                (Some(listed), Some(seen)) => listed > *seen,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
        .collect()
}

/// Errors that end the whole cycle rather than one item.
fn aborts_cycle(error: &Error) -> bool {
    matches!(error, Error::Store(_) | Error::Database(_))
}

pub struct SyncEngine {
    registry: AdapterRegistry,
    exporter: Exporter,
    checkpoints: CheckpointStore,
    ledger: ExportLedger,
    failures: FailureLog,
    lock: SyncLock,
    clock: SharedClock,
    config: SyncConfig,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        registry: AdapterRegistry,
        exporter: Exporter,
        store: SharedStore,
        clock: SharedClock,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            exporter,
            checkpoints: CheckpointStore::new(Arc::clone(&store)),
            ledger: ExportLedger::new(Arc::clone(&store)),
            failures: FailureLog::new(store),
            lock: SyncLock::new(),
            clock,
            config,
        }
    }

    /// Share a lock with other engines in the process.
    #[must_use]
    pub fn with_lock(mut self, lock: SyncLock) -> Self {
        self.lock = lock;
        self
    }

    #[must_use]
    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    #[must_use]
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    #[must_use]
    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    #[must_use]
    pub fn ledger(&self) -> &ExportLedger {
        &self.ledger
    }

    /// Run one cycle over the selected sources.
    ///
    /// Returns [`CycleOutcome::Skipped`] without doing anything when another
    /// cycle holds the lock.
    ///
    /// # Errors
    ///
    /// Store failures. The lock is released either way.
    pub async fn run_cycle(
        &self,
        options: &SyncOptions,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<CycleOutcome> {
        let Some(_guard) = self.lock.try_acquire() else {
            info!("sync already running; trigger ignored");
            return Ok(CycleOutcome::Skipped);
        };

        let started_at = self.clock.now();
        let sources = options
            .sources
            .clone()
            .unwrap_or_else(|| self.registry.platforms());
        info!(sources = ?sources, "sync cycle started");
        emit(
            on_progress,
            SyncProgress::CycleStarted {
                sources: sources.clone(),
            },
        );

        let mut reports = Vec::with_capacity(sources.len());
        for source in sources {
            reports.push(self.sync_source(source, options, on_progress).await?);
        }

        let report = CycleReport {
            started_at,
            finished_at: self.clock.now(),
            sources: reports,
        };
        info!(
            exported = report.exported(),
            unchanged = report.unchanged(),
            failed = report.failed(),
            "sync cycle complete"
        );
        emit(
            on_progress,
            SyncProgress::CycleComplete {
                exported: report.exported(),
                unchanged: report.unchanged(),
                failed: report.failed(),
            },
        );
        Ok(CycleOutcome::Completed(report))
    }

    async fn sync_source(
        &self,
        source: SourcePlatform,
        options: &SyncOptions,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SourceReport> {
        // The window closes at listing time; activity after it belongs to
        // the next cycle.
        let window_end = self.clock.now();
        let checkpoint = self.checkpoints.load(source)?;
        let mut report = SourceReport::new(source, checkpoint.clone());

        emit(on_progress, SyncProgress::ListingSource { source });
        let listed = match self.list_source(source).await {
            Ok(listed) => listed,
            Err(e) if aborts_cycle(&e) => return Err(e),
            Err(e) => {
                warn!(source = %source, error = %e, "listing failed; checkpoint kept");
                emit(
                    on_progress,
                    SyncProgress::SourceFailed {
                        source,
                        error: e.reason(),
                    },
                );
                report.error = Some(e.reason());
                return Ok(report);
            }
        };
        let (adapter, threads) = listed;
        report.listed = threads.len();

        let exported = self.ledger.exported_ids(source)?;
        let mut candidates = if self.config.refresh_changed {
            filter_changed(
                threads,
                &checkpoint,
                &exported,
                &self.ledger.checked_activity(source)?,
            )
        } else {
            filter_new(threads, &checkpoint, &exported)
        };
        let exhausted: HashSet<String> = self
            .failures
            .list()?
            .into_iter()
            .filter(|r| r.source == source && r.attempts >= MAX_AUTO_ATTEMPTS)
            .map(|r| r.id)
            .collect();
        candidates.retain(|t| !exhausted.contains(&t.id));
        report.candidates = candidates.len();

        let limit = options.max_items.unwrap_or(self.config.max_items_per_cycle);
        let batch: Vec<Thread> = candidates.iter().take(limit).cloned().collect();
        report.backlog = candidates.len() - batch.len();
        debug!(
            source = %source,
            listed = report.listed,
            candidates = report.candidates,
            batch = batch.len(),
            "listing filtered"
        );
        emit(
            on_progress,
            SyncProgress::Filtered {
                source,
                listed: report.listed,
                candidates: report.candidates,
                batch: batch.len(),
            },
        );

        let pause = Duration::from_millis(self.config.sub_batch_pause_ms);
        for (i, chunk) in batch.chunks(self.config.sub_batch_size.max(1)).enumerate() {
            if i > 0 && !pause.is_zero() {
                emit(on_progress, SyncProgress::Pausing { pause });
                self.clock.sleep(pause).await;
            }
            for thread in chunk {
                let item = self
                    .process(adapter.as_ref(), thread, options.force, on_progress)
                    .await?;
                report.items.push(item);
            }
        }

        let last_seen = batch.first().map(|t| t.id.clone());
        report.checkpoint = if report.backlog == 0 {
            self.checkpoints.advance(source, window_end, last_seen)?
        } else {
            self.checkpoints.record_seen(source, last_seen)?
        };
        emit(
            on_progress,
            SyncProgress::CheckpointAdvanced {
                source,
                backlog: report.backlog,
            },
        );
        Ok(report)
    }

    async fn list_source(
        &self,
        source: SourcePlatform,
    ) -> Result<(Arc<dyn SourceAdapter>, Vec<Thread>)> {
        let adapter = self.registry.get(source)?;
        // A cached listing from the previous cycle would hide new activity.
        adapter.invalidate_cache().await;
        let threads = adapter.list_all(None).await?;
        let stats = adapter.cache_stats().await;
        debug!(
            source = %source,
            listed = threads.len(),
            fetches = stats.network_fetches,
            pages = stats.cached_pages,
            "source listed"
        );
        Ok((adapter, threads))
    }

    /// Fetch and export one listed thread, logging a failure instead of
    /// returning it.
    async fn process(
        &self,
        adapter: &dyn SourceAdapter,
        thread: &Thread,
        force: bool,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<ItemResult> {
        let mut detail = adapter.fetch_detail(&thread.id).await;
        if detail.thread.title.trim().is_empty() {
            detail.thread.title.clone_from(&thread.title);
        }
        if detail.thread.last_activity.is_none() {
            detail.thread.last_activity = thread.last_activity;
        }
        let source = thread.source;
        let title = detail.thread.title.clone();

        let outcome = match detail.error.clone() {
            Some(reason) => Err(reason),
            None => match self.export_detail(detail, force).await {
                Ok(outcome) => Ok(outcome),
                Err(e) if aborts_cycle(&e) => return Err(e),
                Err(e) => Err(e.reason()),
            },
        };

        let outcome = match outcome {
            Ok(outcome) => {
                if let Some(activity) = thread.last_activity {
                    self.ledger.record_activity(source, &thread.id, activity)?;
                }
                match &outcome {
                    ItemOutcome::Exported {
                        page_id, degraded, ..
                    } => emit(
                        on_progress,
                        SyncProgress::Exported {
                            source,
                            id: thread.id.clone(),
                            title: title.clone(),
                            page_id: page_id.clone(),
                            degraded: *degraded,
                        },
                    ),
                    _ => emit(
                        on_progress,
                        SyncProgress::Unchanged {
                            source,
                            id: thread.id.clone(),
                        },
                    ),
                }
                outcome
            }
            Err(reason) => {
                warn!(source = %source, id = %thread.id, reason = %reason, "item failed");
                self.failures
                    .record(source, &thread.id, &title, &reason, self.clock.now())?;
                emit(
                    on_progress,
                    SyncProgress::ItemFailed {
                        source,
                        id: thread.id.clone(),
                        error: reason.clone(),
                    },
                );
                ItemOutcome::Failed { reason }
            }
        };

        Ok(ItemResult {
            source,
            id: thread.id.clone(),
            title,
            outcome,
        })
    }

    /// Export a fetched detail unless its fingerprint matches the last
    /// export. `force` skips the fingerprint check.
    ///
    /// A re-export of a changed thread archives the page written before.
    ///
    /// # Errors
    ///
    /// `Validation` for a detail without entries, write errors from the
    /// dispatch queue, and store failures.
    pub async fn export_detail(&self, detail: ThreadDetail, force: bool) -> Result<ItemOutcome> {
        let detail = normalize_detail(detail);
        let source = detail.thread.source;
        let id = detail.thread.id.clone();
        if detail.entries.is_empty() {
            return Err(Error::Validation(format!("thread {id} has no entries")));
        }

        let current = fingerprint(&detail);
        if !force && is_unchanged(&current, self.ledger.fingerprint(source, &id)?.as_ref()) {
            debug!(source = %source, id = %id, "fingerprint unchanged; skipping");
            return Ok(ItemOutcome::Unchanged);
        }

        if detail.is_degraded() {
            warn!(source = %source, id = %id, "exporting entries recovered from the document");
        }
        let previous = self.ledger.page_for(source, &id)?;
        let receipt = self.exporter.export(&detail).await?;
        self.ledger
            .mark_exported(source, &id, &current, &receipt.page.id)?;
        self.failures.remove(source, &id)?;

        if let Some(old) = previous.filter(|p| *p != receipt.page.id) {
            if let Err(e) = self.exporter.archive(&old).await {
                warn!(page = %old, error = %e, "could not archive superseded page");
            }
        }

        info!(source = %source, id = %id, page = %receipt.page.id, calls = receipt.calls, "exported");
        Ok(ItemOutcome::Exported {
            page_id: receipt.page.id,
            url: receipt.page.url,
            calls: receipt.calls,
            blocks: receipt.blocks,
            degraded: detail.is_degraded(),
        })
    }

    /// Fetch and export one item by hand, outside the checkpoint window.
    ///
    /// Shares the cycle lock. Does not move the checkpoint.
    ///
    /// # Errors
    ///
    /// `SyncInProgress` when a cycle is running, `Config` for a disabled
    /// source, store failures.
    pub async fn retry_item(
        &self,
        source: SourcePlatform,
        id: &str,
        force: bool,
    ) -> Result<ItemResult> {
        let _guard = self.lock.try_acquire().ok_or(Error::SyncInProgress)?;
        let adapter = self.registry.get(source)?;
        let title = self
            .failures
            .get(source, id)?
            .map(|r| r.title)
            .unwrap_or_default();
        let thread = Thread::new(id, title, source);
        self.process(adapter.as_ref(), &thread, force, None).await
    }

    /// Checkpoints, ledger sizes and queue depth.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn state(&self) -> Result<EngineState> {
        let mut sources = Vec::new();
        for source in self.registry.platforms() {
            sources.push(SourceState {
                source,
                checkpoint: self.checkpoints.load(source)?,
                exported: self.ledger.exported_ids(source)?.len(),
            });
        }
        Ok(EngineState {
            running: self.lock.is_held(),
            sources,
            failures: self.failures.list()?.len(),
            queue_depth: self.exporter.queue_depth(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn thread(id: &str, secs: i64) -> Thread {
        Thread::new(id, id.to_uppercase(), SourcePlatform::Perplexity).with_activity(at(secs))
    }

    #[test]
    fn test_filter_since_checkpoint() {
        let checkpoint = Checkpoint {
            last_sync_time: Some(at(15)),
            last_seen_id: None,
        };
        let kept = filter_since(vec![thread("a", 10), thread("b", 20)], &checkpoint);
        let ids: Vec<_> = kept.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_filter_new_drops_exported_and_orders_newest_first() {
        let exported: HashSet<String> = ["b".to_string()].into();
        let kept = filter_new(
            vec![thread("a", 30), thread("b", 40), thread("c", 50)],
            &Checkpoint::default(),
            &exported,
        );
        let ids: Vec<_> = kept.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_filter_changed_needs_fresh_activity_for_exported_threads() {
        let exported: HashSet<String> = ["a", "b", "c", "f"].map(String::from).into();
        let checked: HashMap<String, DateTime<Utc>> =
            [("a".to_string(), at(30)), ("b".to_string(), at(30))].into();
        let kept = filter_changed(
            vec![
                thread("a", 30),
                thread("b", 45),
                thread("c", 20),
                thread("d", 10),
                Thread::new("e", "E", SourcePlatform::Perplexity),
                Thread::new("f", "F", SourcePlatform::Perplexity),
            ],
            &Checkpoint::default(),
            &exported,
            &checked,
        );
        let ids: Vec<_> = kept.iter().map(|t| t.id.as_str()).collect();
        // a not newer, c never checked, d and e never exported, f no activity.
        assert_eq!(ids, vec!["b", "c", "d", "e"]);
    }

    #[test]
    fn test_store_failures_abort_cycle() {
        assert!(aborts_cycle(&Error::Store("down".into())));
        assert!(!aborts_cycle(&Error::Transport("reset".into())));
        assert!(!aborts_cycle(&Error::StaleDispatch { waited_secs: 301 }));
    }
}
