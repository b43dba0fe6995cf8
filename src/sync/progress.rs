//! Progress events emitted during a sync cycle.

use crate::model::SourcePlatform;
use std::time::Duration;

/// Progress events, in the order a cycle produces them.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// The lock was taken and the cycle began.
    CycleStarted { sources: Vec<SourcePlatform> },

    ListingSource { source: SourcePlatform },

    /// Listing finished and was filtered against the checkpoint and ledger.
    Filtered {
        source: SourcePlatform,
        listed: usize,
        candidates: usize,
        batch: usize,
    },

    /// The source could not be listed; its checkpoint stays put.
    SourceFailed { source: SourcePlatform, error: String },

    Exported {
        source: SourcePlatform,
        id: String,
        title: String,
        page_id: String,
        degraded: bool,
    },

    /// Fingerprint matched the last export.
    Unchanged { source: SourcePlatform, id: String },

    ItemFailed {
        source: SourcePlatform,
        id: String,
        error: String,
    },

    /// Pausing between sub-batches.
    Pausing { pause: Duration },

    CheckpointAdvanced {
        source: SourcePlatform,
        backlog: usize,
    },

    CycleComplete {
        exported: usize,
        unchanged: usize,
        failed: usize,
    },
}

/// Callback for progress updates.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_with_and_without_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(
            Some(&callback),
            SyncProgress::ListingSource {
                source: SourcePlatform::Claude,
            },
        );
        emit(
            None,
            SyncProgress::ListingSource {
                source: SourcePlatform::Claude,
            },
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
