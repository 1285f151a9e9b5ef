//! Per-key mutual exclusion for async tasks.
//!
//! Entries live only while some task holds or awaits the key's lock;
//! once the last guard drops the entry is removed, so the map stays
//! proportional to in-flight work rather than to every key ever seen.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one key. Dropping releases the key and evicts the
/// map entry when no other task is waiting on it.
pub struct KeyedGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Tasks on distinct keys
    /// proceed independently.
    pub async fn acquire(&self, key: &str) -> KeyedGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.clone().lock_owned().await;
        KeyedGuard {
            locks: self,
            key: key.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or contended.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release the key before inspecting the refcount.
        self.guard.take();

        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Two references mean the map entry plus ours; any more and a
        // waiter cloned the Arc inside `acquire`, so the entry stays.
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.key);
        }
    }
}
