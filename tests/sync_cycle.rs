//! End-to-end sync cycles over a scripted source and a recording writer.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadsync::adapter::{AdapterRegistry, CacheStats, ListingCallback, SourceAdapter};
use threadsync::clock::{Clock, ManualClock};
use threadsync::config::{DispatchConfig, SyncConfig};
use threadsync::dispatch::{DispatchQueue, RetryPolicy};
use threadsync::error::{Error, Result};
use threadsync::export::{Exporter, PageParent, PageRef, PageRequest, PageWriter};
use threadsync::model::{Checkpoint, Entry, ListPage, SourcePlatform, Thread, ThreadDetail};
use threadsync::storage::{KeyValueStore, MemoryStore, SharedStore};
use threadsync::sync::{CycleOutcome, CycleReport, ItemOutcome, SyncEngine, SyncOptions, run_scheduled};

const SOURCE: SourcePlatform = SourcePlatform::Perplexity;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn detail(id: &str, title: &str, queries: &[&str]) -> ThreadDetail {
    let entries = queries
        .iter()
        .map(|q| Entry::new(*q, format!("answer to {q}")))
        .collect();
    ThreadDetail::new(Thread::new(id, title, SOURCE), entries)
}

/// Source with a fixed listing and scripted details.
#[derive(Default)]
struct ScriptedSource {
    threads: Mutex<Vec<Thread>>,
    details: Mutex<HashMap<String, ThreadDetail>>,
    fetched: Mutex<Vec<String>>,
    invalidations: AtomicUsize,
}

impl ScriptedSource {
    fn add(&self, id: &str, activity: i64, queries: &[&str]) {
        let title = format!("Thread {id}");
        let mut threads = self.threads.lock().unwrap();
        threads.retain(|t| t.id != id);
        threads.push(Thread::new(id, title.clone(), SOURCE).with_activity(at(activity)));
        drop(threads);
        self.details
            .lock()
            .unwrap()
            .insert(id.to_string(), detail(id, &title, queries));
    }

    fn break_detail(&self, id: &str) {
        self.details.lock().unwrap().remove(id);
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn platform(&self) -> SourcePlatform {
        SOURCE
    }

    fn identify(&self, locator: &str) -> Option<String> {
        locator.strip_prefix("scripted://").map(str::to_string)
    }

    async fn list_items(&self, offset: usize, limit: usize) -> Result<ListPage> {
        let threads = self.threads.lock().unwrap().clone();
        let items: Vec<_> = threads.iter().skip(offset).take(limit).cloned().collect();
        Ok(ListPage {
            has_more: offset + items.len() < threads.len(),
            items,
        })
    }

    async fn list_all(&self, _progress: Option<&ListingCallback<'_>>) -> Result<Vec<Thread>> {
        Ok(self.threads.lock().unwrap().clone())
    }

    async fn fetch_detail(&self, id: &str) -> ThreadDetail {
        self.fetched.lock().unwrap().push(id.to_string());
        self.details.lock().unwrap().get(id).cloned().unwrap_or_else(|| {
            ThreadDetail::failed(Thread::new(id, "", SOURCE), "TRANSPORT_ERROR: endpoint down")
        })
    }

    async fn invalidate_cache(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            breakpoints: 0,
            cached_pages: 0,
            full_listing_items: None,
            network_fetches: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create { title: String, children: usize },
    Append { page_id: String, children: usize },
    Archive { page_id: String },
}

#[derive(Default)]
struct RecordingWriter {
    calls: Mutex<Vec<Call>>,
    reject_appends: AtomicBool,
}

impl RecordingWriter {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn created_titles(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PageWriter for RecordingWriter {
    async fn create_page(&self, request: &PageRequest) -> Result<PageRef> {
        let title = request.properties["title"]["title"][0]["text"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::Create {
            title,
            children: request.children.len(),
        });
        Ok(PageRef {
            id: format!("page-{}", calls.len()),
            url: None,
        })
    }

    async fn append_children(&self, page_id: &str, children: &[Value]) -> Result<()> {
        if self.reject_appends.load(Ordering::SeqCst) {
            return Err(Error::Validation("body.children failed validation".into()));
        }
        self.calls.lock().unwrap().push(Call::Append {
            page_id: page_id.to_string(),
            children: children.len(),
        });
        Ok(())
    }

    async fn archive_page(&self, page_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Archive {
            page_id: page_id.to_string(),
        });
        Ok(())
    }
}

struct Harness {
    clock: ManualClock,
    store: Arc<MemoryStore>,
    source: Arc<ScriptedSource>,
    writer: Arc<RecordingWriter>,
    engine: SyncEngine,
}

fn harness(config: SyncConfig) -> Harness {
    let clock = ManualClock::at_epoch(1_000);
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::default());
    let writer = Arc::new(RecordingWriter::default());

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::clone(&source) as Arc<dyn SourceAdapter>);

    let queue = DispatchQueue::spawn(
        Arc::clone(&writer) as Arc<dyn PageWriter>,
        Arc::new(clock.clone()),
        Arc::clone(&store) as SharedStore,
        DispatchConfig::default(),
        RetryPolicy::default(),
    );
    let exporter = Exporter::new(Arc::new(queue), PageParent::Page("root".into()));
    let engine = SyncEngine::new(
        registry,
        exporter,
        Arc::clone(&store) as SharedStore,
        Arc::new(clock.clone()),
        config,
    );
    Harness {
        clock,
        store,
        source,
        writer,
        engine,
    }
}

async fn cycle(h: &Harness, options: &SyncOptions) -> CycleReport {
    match h.engine.run_cycle(options, None).await.unwrap() {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    }
}

fn checkpoint(h: &Harness) -> Checkpoint {
    h.engine.checkpoints().load(SOURCE).unwrap()
}

#[tokio::test]
async fn test_only_items_newer_than_checkpoint_are_exported() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 10, &["first"]);
    h.source.add("b", 20, &["second"]);
    h.engine.checkpoints().advance(SOURCE, at(15), None).unwrap();

    let report = cycle(&h, &SyncOptions::default()).await;

    assert_eq!(report.sources[0].listed, 2);
    assert_eq!(report.sources[0].candidates, 1);
    assert_eq!(h.source.fetched(), vec!["b"]);
    assert_eq!(h.writer.created_titles(), vec!["Thread b"]);
    assert!(h.engine.ledger().is_exported(SOURCE, "b").unwrap());
    assert!(!h.engine.ledger().is_exported(SOURCE, "a").unwrap());
}

#[tokio::test]
async fn test_checkpoint_never_decreases_including_empty_cycles() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 500, &["q"]);

    let first = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(first.exported(), 1);
    let after_first = checkpoint(&h).last_sync_time.unwrap();
    assert_eq!(checkpoint(&h).last_seen_id.as_deref(), Some("a"));

    h.clock.advance(Duration::from_secs(60));
    let second = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(second.exported(), 0);
    assert_eq!(second.sources[0].candidates, 0);
    let after_second = checkpoint(&h).last_sync_time.unwrap();
    assert!(after_second > after_first);

    h.clock.advance(Duration::from_secs(60));
    cycle(&h, &SyncOptions::default()).await;
    assert!(checkpoint(&h).last_sync_time.unwrap() > after_second);
    assert_eq!(h.writer.created_titles().len(), 1);
    // Every cycle lists afresh.
    assert_eq!(h.source.invalidations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exported_ids_are_filtered_even_when_newer() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 5_000, &["q"]);

    cycle(&h, &SyncOptions::default()).await;
    // Activity still after the checkpoint; the ledger keeps it out.
    let report = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(report.sources[0].candidates, 0);
    assert_eq!(h.source.fetched(), vec!["a"]);
}

#[tokio::test]
async fn test_backlog_is_left_for_the_next_cycle() {
    let h = harness(SyncConfig {
        max_items_per_cycle: 3,
        sub_batch_size: 2,
        ..SyncConfig::default()
    });
    for i in 0..5 {
        h.source.add(&format!("t{i}"), 100 + i, &["q"]);
    }

    let first = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(first.exported(), 3);
    assert_eq!(first.sources[0].backlog, 2);
    // Newest first; time held while backlog remains.
    assert_eq!(h.source.fetched(), vec!["t4", "t3", "t2"]);
    assert_eq!(checkpoint(&h).last_sync_time, None);
    assert_eq!(checkpoint(&h).last_seen_id.as_deref(), Some("t4"));
    // Two sub-batches, one pause between them.
    assert_eq!(h.clock.sleeps(), vec![Duration::from_millis(1500)]);

    let second = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(second.exported(), 2);
    assert_eq!(second.sources[0].backlog, 0);
    assert!(checkpoint(&h).last_sync_time.is_some());
}

#[tokio::test]
async fn test_item_failure_is_logged_and_cycle_continues() {
    let h = harness(SyncConfig::default());
    h.source.add("ok-1", 30, &["q"]);
    h.source.add("broken", 20, &["q"]);
    h.source.add("ok-2", 10, &["q"]);
    h.source.break_detail("broken");

    let report = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(report.exported(), 2);
    assert_eq!(report.failed(), 1);

    let failures = h.engine.failures().list().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, "broken");
    assert_eq!(failures[0].title, "Thread broken");
    assert!(failures[0].reason.contains("endpoint down"));

    // Manual retry once the source recovers.
    h.source.add("broken", 20, &["q"]);
    let item = h.engine.retry_item(SOURCE, "broken", false).await.unwrap();
    assert!(matches!(item.outcome, ItemOutcome::Exported { .. }));
    assert!(h.engine.failures().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_unchanged_fingerprint_skips_unless_forced() {
    let h = harness(SyncConfig::default());
    let d = detail("x", "Stable", &["one", "two"]);

    let first = h.engine.export_detail(d.clone(), false).await.unwrap();
    assert!(matches!(first, ItemOutcome::Exported { .. }));

    let second = h.engine.export_detail(d.clone(), false).await.unwrap();
    assert_eq!(second, ItemOutcome::Unchanged);
    assert_eq!(h.writer.created_titles().len(), 1);

    let forced = h.engine.export_detail(d, true).await.unwrap();
    assert!(matches!(forced, ItemOutcome::Exported { .. }));
    assert_eq!(h.writer.created_titles().len(), 2);
    // The superseded page is archived.
    assert!(h.writer.calls().contains(&Call::Archive {
        page_id: "page-1".into()
    }));
}

#[tokio::test]
async fn test_refresh_changed_re_exports_only_changed_threads() {
    let h = harness(SyncConfig {
        refresh_changed: true,
        ..SyncConfig::default()
    });
    h.source.add("a", 5_000, &["q1"]);
    h.source.add("b", 5_000, &["q1"]);
    h.source.add("c", 5_000, &["q1"]);
    cycle(&h, &SyncOptions::default()).await;
    assert_eq!(h.writer.created_titles().len(), 3);

    // a: activity without new content; b: new content; c: untouched.
    h.source.add("a", 9_000, &["q1"]);
    h.source.add("b", 9_000, &["q1", "q2"]);
    let report = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(report.sources[0].candidates, 2);
    assert_eq!(report.exported(), 1);
    assert_eq!(report.unchanged(), 1);
    assert_eq!(h.writer.created_titles().len(), 4);

    // Checked at 9 000 now; nothing left to look at.
    let quiet = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(quiet.sources[0].candidates, 0);
}

#[tokio::test]
async fn test_refresh_changed_drains_backlog_past_unchanged_threads() {
    let h = harness(SyncConfig {
        refresh_changed: true,
        max_items_per_cycle: 2,
        ..SyncConfig::default()
    });
    for i in 0..4 {
        h.source.add(&format!("t{i}"), 5_000 + i, &["q"]);
    }

    let first = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(first.exported(), 2);
    assert_eq!(first.sources[0].backlog, 2);
    assert_eq!(checkpoint(&h).last_sync_time, None);

    let second = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(second.exported(), 2);
    assert_eq!(second.unchanged(), 0);
    assert_eq!(second.sources[0].backlog, 0);
    assert!(checkpoint(&h).last_sync_time.is_some());
    assert_eq!(
        h.writer.created_titles(),
        vec!["Thread t3", "Thread t2", "Thread t1", "Thread t0"]
    );
}

#[tokio::test]
async fn test_failed_append_archives_the_partial_page() {
    let h = harness(SyncConfig::default());
    let queries: Vec<String> = (0..60).map(|i| format!("question {i}")).collect();
    let refs: Vec<&str> = queries.iter().map(String::as_str).collect();
    let big = detail("big", "Big", &refs);

    h.writer.reject_appends.store(true, Ordering::SeqCst);
    let err = h.engine.export_detail(big.clone(), false).await.unwrap_err();
    assert!(err.to_string().contains("page-1"));
    assert_eq!(
        h.writer.calls().last(),
        Some(&Call::Archive {
            page_id: "page-1".into()
        })
    );
    assert!(!h.engine.ledger().is_exported(SOURCE, "big").unwrap());

    h.writer.reject_appends.store(false, Ordering::SeqCst);
    let outcome = h.engine.export_detail(big, false).await.unwrap();
    let ItemOutcome::Exported { page_id, .. } = outcome else {
        panic!("expected export, got {outcome:?}");
    };
    assert_eq!(page_id, "page-3");
    let archived: Vec<_> = h
        .writer
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Archive { .. }))
        .collect();
    assert_eq!(archived.len(), 1);
}

#[tokio::test]
async fn test_large_thread_is_split_into_create_and_append() {
    let h = harness(SyncConfig::default());
    let queries: Vec<String> = (0..60).map(|i| format!("question {i}")).collect();
    let refs: Vec<&str> = queries.iter().map(String::as_str).collect();

    let outcome = h
        .engine
        .export_detail(detail("big", "Big", &refs), false)
        .await
        .unwrap();
    let ItemOutcome::Exported { calls, blocks, .. } = outcome else {
        panic!("expected export, got {outcome:?}");
    };
    assert!(blocks > 100);

    let recorded = h.writer.calls();
    assert_eq!(recorded.len(), calls);
    assert!(matches!(recorded[0], Call::Create { children: 100, .. }));
    let appended: usize = recorded[1..]
        .iter()
        .map(|c| match c {
            Call::Append { page_id, children } => {
                assert_eq!(page_id, "page-1");
                assert!(*children <= 100);
                *children
            }
            other => panic!("unexpected call {other:?}"),
        })
        .sum();
    assert_eq!(100 + appended, blocks);
}

#[tokio::test]
async fn test_second_trigger_while_running_is_a_no_op() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 10, &["q"]);

    let guard = h.engine.lock().try_acquire().unwrap();
    let outcome = h.engine.run_cycle(&SyncOptions::default(), None).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped);
    assert!(h.source.fetched().is_empty());
    assert!(h.engine.retry_item(SOURCE, "a", false).await.is_err());
    drop(guard);

    assert!(matches!(
        h.engine.run_cycle(&SyncOptions::default(), None).await.unwrap(),
        CycleOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn test_store_outage_aborts_cycle_and_releases_lock() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 10, &["q"]);
    h.store.set_unavailable(true);

    assert!(h.engine.run_cycle(&SyncOptions::default(), None).await.is_err());
    assert!(!h.engine.lock().is_held());

    h.store.set_unavailable(false);
    let report = cycle(&h, &SyncOptions::default()).await;
    assert_eq!(report.exported(), 1);
}

#[tokio::test]
async fn test_state_reports_checkpoints_and_counts() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 10, &["q"]);
    h.source.add("b", 20, &[]);
    cycle(&h, &SyncOptions::default()).await;

    let state = h.engine.state().unwrap();
    assert!(!state.running);
    assert_eq!(state.sources.len(), 1);
    assert_eq!(state.sources[0].exported, 1);
    assert_eq!(state.failures, 1);
    assert_eq!(state.queue_depth, 0);
    assert!(state.sources[0].checkpoint.last_sync_time.is_some());
    assert!(h.store.get(&["dispatch:pending"]).unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_runs_cycles_until_shutdown() {
    let h = harness(SyncConfig::default());
    h.source.add("a", 10, &["q"]);

    let summary = run_scheduled(
        &h.engine,
        &SyncOptions::default(),
        Duration::from_millis(10),
        None,
        tokio::time::sleep(Duration::from_millis(35)),
    )
    .await;
    assert!(summary.completed >= 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.writer.created_titles(), vec!["Thread a"]);
    assert!(h.clock.now() >= at(1_000));
}

#[tokio::test]
async fn test_scheduler_skips_while_manual_run_holds_lock() {
    let h = harness(SyncConfig::default());
    let _manual = h.engine.lock().try_acquire().unwrap();

    let summary = run_scheduled(
        &h.engine,
        &SyncOptions::default(),
        Duration::from_millis(10),
        None,
        tokio::time::sleep(Duration::from_millis(25)),
    )
    .await;
    assert_eq!(summary.completed, 0);
    assert!(summary.skipped >= 1);
}
