//! Sliding-window request budget.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// At most `max_requests` in any `window`-long interval.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    max_requests: usize,
    window: Duration,
    stamps: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            stamps: VecDeque::new(),
        }
    }

    fn window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window_chrono();
        while self.stamps.front().is_some_and(|t| now - *t >= window) {
            self.stamps.pop_front();
        }
    }

    /// How long to wait before the next request fits the budget.
    ///
    /// Zero when there is budget; otherwise the time until the oldest
    /// in-window request falls out of the window.
    pub fn wait_time(&mut self, now: DateTime<Utc>) -> Duration {
        self.prune(now);
        if self.stamps.len() < self.max_requests {
            return Duration::ZERO;
        }
        self.stamps
            .front()
            .map(|oldest| (*oldest + self.window_chrono() - now).to_std().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Count a request issued at `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.stamps.push_back(now);
    }

    /// Requests counted in the window ending at `now`.
    pub fn in_window(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.stamps.len()
    }
}
