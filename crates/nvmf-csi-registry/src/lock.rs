//! Per-volume operation locks
//!
//! Lifecycle operations on the same volume must not interleave. Acquisition
//! never waits: a held key is reported back to the caller immediately so the
//! orchestrator's own retry/backoff decides when to try again.

use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{trace, warn};

/// Registry of volume ids with an operation in flight
#[derive(Debug, Default)]
pub struct VolumeLockTable {
    held: Mutex<HashSet<String>>,
}

impl VolumeLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `key` if nobody holds it.
    ///
    /// Returns `None` when another operation holds `key`. The lock is
    /// released when the returned guard is dropped.
    pub fn try_acquire(&self, key: &str) -> Option<VolumeLockGuard<'_>> {
        if self.held.lock().insert(key.to_string()) {
            trace!("Acquired volume lock {}", key);
            Some(VolumeLockGuard {
                table: self,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    /// Whether an operation currently holds `key`
    pub fn is_locked(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.lock().is_empty()
    }

    fn release(&self, key: &str) {
        if self.held.lock().remove(key) {
            trace!("Released volume lock {}", key);
        } else {
            warn!("Released volume lock {} that was not held", key);
        }
    }
}

/// Exclusive hold on one volume id
#[derive(Debug)]
#[must_use = "the volume lock is released as soon as the guard is dropped"]
pub struct VolumeLockGuard<'a> {
    table: &'a VolumeLockTable,
    key: String,
}

impl VolumeLockGuard<'_> {
    /// Locked volume id
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release explicitly; equivalent to dropping the guard
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for VolumeLockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_second_acquire_fails_until_release() {
        let locks = VolumeLockTable::new();

        let guard = locks.try_acquire("vol1").unwrap();
        assert_eq!(guard.key(), "vol1");
        assert!(locks.is_locked("vol1"));
        assert!(locks.try_acquire("vol1").is_none());

        guard.release();
        assert!(!locks.is_locked("vol1"));
        assert!(locks.try_acquire("vol1").is_some());
    }

    #[test]
    fn test_distinct_keys_independent() {
        let locks = VolumeLockTable::new();
        let _a = locks.try_acquire("vol1").unwrap();
        let _b = locks.try_acquire("vol2").unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_released_on_early_return() {
        fn operation(locks: &VolumeLockTable) -> Result<(), &'static str> {
            let _guard = locks.try_acquire("vol1").ok_or("busy")?;
            Err("allocation failed")
        }

        let locks = VolumeLockTable::new();
        assert!(operation(&locks).is_err());
        assert!(locks.is_empty());
    }

    #[test]
    fn test_concurrent_acquire_exactly_one_wins() {
        const CALLERS: usize = 16;
        let locks = Arc::new(VolumeLockTable::new());
        let barrier = Arc::new(Barrier::new(CALLERS));
        let winners = Arc::new(AtomicUsize::new(0));
        let hold = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                let hold = Arc::clone(&hold);
                std::thread::spawn(move || {
                    barrier.wait();
                    let guard = locks.try_acquire("volX");
                    if guard.is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    // keep the winner's guard alive until every caller tried
                    hold.wait();
                    drop(guard);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
