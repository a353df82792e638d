//! Per-key in-flight serialization.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per key, created on first use and forgotten once the
/// last holder or waiter is gone.
///
/// A second caller for a busy key waits for the in-flight holder to finish;
/// callers for other keys proceed independently.
pub struct ScopeLocks<K: Eq + Hash> {
    locks: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

/// Held for the duration of one in-flight attempt.
pub struct ScopeGuard<'a, K: Eq + Hash> {
    locks: &'a ScopeLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> ScopeLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Wait until no other holder of `key` is in flight.
    pub async fn acquire(&self, key: &K) -> ScopeGuard<'_, K> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        ScopeGuard {
            locks: self,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Whether a holder of `key` is currently in flight.
    #[cfg(test)]
    pub fn is_busy(&self, key: &K) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<K: Eq + Hash + Clone> Default for ScopeLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for ScopeGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map
        // still refers to the lock. New callers need the map lock to clone it.
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
