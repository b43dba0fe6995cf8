//! Process-wide sync lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Guards against two sync cycles running at once.
///
/// Clones share the same flag. A trigger that finds the lock held is a
/// no-op; it is not queued.
#[derive(Debug, Clone, Default)]
pub struct SyncLock {
    held: Arc<AtomicBool>,
}

impl SyncLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` if a cycle already holds it.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SyncLockGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncLockGuard {
                held: Arc::clone(&self.held),
            })
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the lock when dropped, on every exit path.
#[derive(Debug)]
pub struct SyncLockGuard {
    held: Arc<AtomicBool>,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let lock = SyncLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(lock.clone().try_acquire().is_none());
        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_release_on_early_return() {
        fn failing_cycle(lock: &SyncLock) -> Result<(), &'static str> {
            let _guard = lock.try_acquire().ok_or("busy")?;
            Err("listing failed")
        }

        let lock = SyncLock::new();
        assert_eq!(failing_cycle(&lock), Err("listing failed"));
        assert!(!lock.is_held());
    }
}
