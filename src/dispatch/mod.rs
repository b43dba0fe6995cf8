//! Outbound write dispatch.
//!
//! # Submodules
//!
//! - [`queue`] - Single-worker FIFO with staleness, pacing and retry
//! - [`retry`] - Retry schedule for writes
//! - [`window`] - Sliding-window request budget

pub mod queue;
pub mod retry;
pub mod window;

pub use queue::{DispatchQueue, PENDING_KEY, WriteOp, WriteOutcome};
pub use retry::RetryPolicy;
pub use window::SlidingWindow;
