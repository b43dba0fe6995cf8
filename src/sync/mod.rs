//! Incremental sync of chat threads into the page API.
//!
//! # Architecture
//!
//! The [`SyncEngine`] owns all state that survives between cycles, kept in
//! the key-value store:
//!
//! - **Checkpoints**: per-source watermark ([`CheckpointStore`])
//! - **Ledger**: exported ids, fingerprints and page ids ([`ExportLedger`])
//! - **Failures**: bounded per-item failure log ([`FailureLog`])
//!
//! Cycles are triggered by [`run_scheduled`] or by hand; both go through
//! [`SyncEngine::run_cycle`] and share one [`SyncLock`].
//!
//! # Example
//!
//! ```ignore
//! use threadsync::sync::{SyncEngine, SyncOptions, CycleOutcome};
//!
//! let engine = SyncEngine::new(registry, exporter, store, clock, config.sync);
//! match engine.run_cycle(&SyncOptions::default(), None).await? {
//!     CycleOutcome::Completed(report) => println!("{} exported", report.exported()),
//!     CycleOutcome::Skipped => println!("already running"),
//! }
//! ```

mod checkpoint;
mod engine;
mod failures;
mod ledger;
mod lock;
pub mod progress;
mod scheduler;
mod types;

pub use checkpoint::CheckpointStore;
pub use engine::{SyncEngine, filter_changed, filter_new, filter_since};
pub use failures::{FAILURES_KEY, FailureLog, FailureRecord, MAX_FAILURES};
pub use ledger::ExportLedger;
pub use lock::{SyncLock, SyncLockGuard};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use scheduler::{ScheduleSummary, run_scheduled};
pub use types::{
    CycleOutcome, CycleReport, EngineState, ItemOutcome, ItemResult, MAX_AUTO_ATTEMPTS,
    SourceReport, SourceState, SyncOptions,
};
