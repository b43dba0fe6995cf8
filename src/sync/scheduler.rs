//! Timer-driven sync cycles.

use crate::sync::progress::ProgressCallback;
use crate::sync::types::{CycleOutcome, SyncOptions};
use crate::sync::SyncEngine;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Totals of a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Run a cycle now and then every `interval` until `shutdown` resolves.
///
/// Ticks that fall due while a cycle is still running are dropped, and a
/// cycle that finds the lock held (a manual run) counts as skipped. A
/// failed cycle is logged; the schedule continues.
pub async fn run_scheduled(
    engine: &SyncEngine,
    options: &SyncOptions,
    interval: Duration,
    on_progress: Option<&ProgressCallback>,
    shutdown: impl Future<Output = ()>,
) -> ScheduleSummary {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut summary = ScheduleSummary::default();
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                match engine.run_cycle(options, on_progress).await {
                    Ok(CycleOutcome::Completed(report)) => {
                        summary.completed += 1;
                        info!(
                            exported = report.exported(),
                            failed = report.failed(),
                            next_in = ?interval,
                            "scheduled cycle finished"
                        );
                    }
                    Ok(CycleOutcome::Skipped) => summary.skipped += 1,
                    Err(e) => {
                        summary.failed += 1;
                        warn!(error = %e, "scheduled cycle failed");
                    }
                }
            }
        }
    }
    info!(?summary, "scheduler stopped");
    summary
}
