//! Token sync mutual exclusion
//!
//! Only one token sync may run at a time. [`SyncTokensLock::lock`] hands
//! out a guard; a second `lock` fails until the guard is released.

use crate::error::LockError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-holder flag guarding token syncs
#[derive(Debug, Clone, Default)]
pub struct SyncTokensLock {
    locked: Arc<AtomicBool>,
}

impl SyncTokensLock {
    /// Create unlocked
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock
    ///
    /// # Errors
    /// Returns `LockError::AlreadyLocked` while another guard is alive
    pub fn lock(&self) -> Result<SyncTokensGuard, LockError> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LockError::AlreadyLocked)?;
        Ok(SyncTokensGuard {
            locked: Arc::clone(&self.locked),
        })
    }

    /// Whether a sync is in flight
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Held while a sync runs; releases on [`unlock`](Self::unlock) or drop
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SyncTokensGuard {
    locked: Arc<AtomicBool>,
}

impl SyncTokensGuard {
    /// Release the lock
    pub fn unlock(self) {
        drop(self);
    }
}

impl Drop for SyncTokensGuard {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_fails() {
        let lock = SyncTokensLock::new();
        let _guard = lock.lock().unwrap();
        assert_eq!(lock.lock().unwrap_err(), LockError::AlreadyLocked);
        assert!(lock.is_locked());
    }

    #[test]
    fn unlock_allows_relock() {
        let lock = SyncTokensLock::new();
        let guard = lock.lock().unwrap();
        guard.unlock();
        assert!(!lock.is_locked());
        assert!(lock.lock().is_ok());
    }

    #[test]
    fn drop_releases() {
        let lock = SyncTokensLock::new();
        {
            let _guard = lock.lock().unwrap();
        }
        assert!(lock.lock().is_ok());
    }

    #[test]
    fn clones_share_the_flag() {
        let lock = SyncTokensLock::new();
        let other = lock.clone();
        let _guard = lock.lock().unwrap();
        assert!(other.lock().is_err());
    }
}
