//! Rate-limited FIFO in front of the outbound write API.
//!
//! A single worker task drains the queue one write at a time:
//!
//! 1. Entries older than `stale_after` are rejected with
//!    [`Error::StaleDispatch`].
//! 2. The head entry waits for budget in the [`SlidingWindow`]; every
//!    attempt, retries included, is counted.
//! 3. Failed attempts are retried per [`RetryPolicy`].
//! 4. After a success the worker pauses: briefly while a backlog is
//!    waiting, longer when the queue is shallow.
//!
//! Callers get the result of their own write through a oneshot channel; a
//! failure rejects only that write.

use crate::clock::SharedClock;
use crate::config::DispatchConfig;
use crate::dispatch::{RetryPolicy, SlidingWindow};
use crate::error::{Error, Result};
use crate::export::{PageRef, PageRequest, PageWriter};
use crate::storage::{KeyValueStoreExt, SharedStore};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Store key of the in-flight task bookkeeping.
pub const PENDING_KEY: &str = "dispatch:pending";

/// One write against the page API.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    CreatePage(PageRequest),
    AppendChildren { page_id: String, children: Vec<Value> },
    ArchivePage { page_id: String },
}

impl WriteOp {
    fn kind(&self) -> &'static str {
        match self {
            Self::CreatePage(_) => "create_page",
            Self::AppendChildren { .. } => "append_children",
            Self::ArchivePage { .. } => "archive_page",
        }
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(PageRef),
    Appended { page_id: String, count: usize },
    Archived { page_id: String },
}

struct Task {
    id: String,
    op: WriteOp,
    enqueued_at: DateTime<Utc>,
    reply: oneshot::Sender<Result<WriteOutcome>>,
}

/// Handle to the dispatch worker.
///
/// Dropping every handle closes the queue; the worker finishes what is
/// already queued and exits.
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<Task>,
    clock: SharedClock,
    depth: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl DispatchQueue {
    /// Start the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        writer: Arc<dyn PageWriter>,
        clock: SharedClock,
        store: SharedStore,
        config: DispatchConfig,
        retry: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            writer,
            clock: Arc::clone(&clock),
            store,
            window: SlidingWindow::new(config.max_requests, config.window()),
            config,
            retry,
            depth: Arc::clone(&depth),
        };
        let handle = tokio::spawn(worker.run(rx));
        Self {
            tx,
            clock,
            depth,
            handle,
        }
    }

    /// Queue a write and wait for its result.
    ///
    /// # Errors
    ///
    /// The write's own error, `StaleDispatch` if it waited too long, or
    /// `Other` if the worker is gone.
    pub async fn enqueue(&self, op: WriteOp) -> Result<WriteOutcome> {
        let (reply, response) = oneshot::channel();
        let task = Task {
            id: format!("dsp_{}", &Uuid::new_v4().to_string()[..12]),
            op,
            enqueued_at: self.clock.now(),
            reply,
        };
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Other("dispatch queue is closed".to_string()));
        }
        response
            .await
            .map_err(|_| Error::Other("dispatch worker stopped".to_string()))?
    }

    /// Writes queued or in flight.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "dispatch worker ended abnormally");
        }
    }
}

struct Worker {
    writer: Arc<dyn PageWriter>,
    clock: SharedClock,
    store: SharedStore,
    window: SlidingWindow,
    config: DispatchConfig,
    retry: RetryPolicy,
    depth: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Task>) {
        // Bookkeeping left by a previous process refers to callers that no
        // longer exist.
        if let Err(e) = self.store.remove(&[PENDING_KEY]) {
            warn!(error = %e, "could not purge dispatch bookkeeping");
        }

        let mut queue: VecDeque<Task> = VecDeque::new();
        loop {
            if queue.is_empty() {
                match rx.recv().await {
                    Some(task) => self.accept(&mut queue, task),
                    None => break,
                }
            }
            while let Ok(task) = rx.try_recv() {
                self.accept(&mut queue, task);
            }

            self.expire_stale(&mut queue);
            let Some(task) = queue.pop_front() else {
                continue;
            };

            debug!(task = %task.id, op = task.op.kind(), waiting = queue.len(), "dispatching");
            let result = self.execute(&task.op).await;
            let succeeded = result.is_ok();
            self.finish(task, result);

            if succeeded {
                let pause = self.pacing();
                if !pause.is_zero() {
                    self.clock.sleep(pause).await;
                }
            }
        }
        debug!("dispatch queue closed");
    }

    fn accept(&self, queue: &mut VecDeque<Task>, task: Task) {
        self.update_pending(|pending| {
            pending.insert(task.id.clone(), Value::String(task.enqueued_at.to_rfc3339()));
        });
        queue.push_back(task);
    }

    fn finish(&self, task: Task, result: Result<WriteOutcome>) {
        self.update_pending(|pending| {
            pending.remove(&task.id);
        });
        self.depth.fetch_sub(1, Ordering::SeqCst);
        // The caller may have given up; nothing to do then.
        let _ = task.reply.send(result);
    }

    fn expire_stale(&self, queue: &mut VecDeque<Task>) {
        let now = self.clock.now();
        let limit = chrono::Duration::from_std(self.config.stale_after())
            .unwrap_or_else(|_| chrono::Duration::zero());

        let (stale, fresh): (VecDeque<Task>, VecDeque<Task>) = queue
            .drain(..)
            .partition(|task| now - task.enqueued_at > limit);
        *queue = fresh;

        for task in stale {
            let waited_secs = u64::try_from((now - task.enqueued_at).num_seconds()).unwrap_or(0);
            warn!(task = %task.id, op = task.op.kind(), waited_secs, "dispatch expired in queue");
            self.finish(task, Err(Error::StaleDispatch { waited_secs }));
        }
    }

    /// Run one write with window admission and retry.
    async fn execute(&mut self, op: &WriteOp) -> Result<WriteOutcome> {
        let mut attempt = 0u32;
        loop {
            loop {
                let wait = self.window.wait_time(self.clock.now());
                if wait.is_zero() {
                    break;
                }
                let now = self.clock.now();
                info!(
                    ?wait,
                    in_window = self.window.in_window(now),
                    "dispatch budget exhausted; waiting"
                );
                self.clock.sleep(wait).await;
            }
            self.window.record(self.clock.now());

            match self.apply(op).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let delay = self.retry.delay_for(attempt, &e);
                    warn!(op = op.kind(), attempt, error = %e, ?delay, "write failed; retrying");
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn apply(&self, op: &WriteOp) -> Result<WriteOutcome> {
        match op {
            WriteOp::CreatePage(request) => {
                self.writer.create_page(request).await.map(WriteOutcome::Created)
            }
            WriteOp::AppendChildren { page_id, children } => {
                self.writer.append_children(page_id, children).await?;
                Ok(WriteOutcome::Appended {
                    page_id: page_id.clone(),
                    count: children.len(),
                })
            }
            WriteOp::ArchivePage { page_id } => {
                self.writer.archive_page(page_id).await?;
                Ok(WriteOutcome::Archived {
                    page_id: page_id.clone(),
                })
            }
        }
    }

    /// Pause after a success, shorter while a backlog is waiting.
    fn pacing(&self) -> Duration {
        let waiting = self.depth.load(Ordering::SeqCst);
        if waiting == 0 {
            Duration::ZERO
        } else if waiting >= self.config.deep_queue {
            Duration::from_millis(self.config.fast_pace_ms)
        } else {
            Duration::from_millis(self.config.slow_pace_ms)
        }
    }

    fn update_pending(&self, edit: impl FnOnce(&mut Map<String, Value>)) {
        let result = self
            .store
            .get_as::<Map<String, Value>>(PENDING_KEY)
            .and_then(|pending| {
                let mut pending = pending.unwrap_or_default();
                edit(&mut pending);
                if pending.is_empty() {
                    self.store.remove(&[PENDING_KEY])
                } else {
                    self.store.set_one(PENDING_KEY, &pending)
                }
            });
        if let Err(e) = result {
            warn!(error = %e, "could not update dispatch bookkeeping");
        }
    }
}
