//! Per-key mutual exclusion.
//!
//! Two operations holding the same key never interleave; operations on
//! different keys run in parallel. The lock is **not reentrant**: calling
//! [`KeyedLock::run_exclusively`] for a key from inside an action already
//! holding that key waits forever.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type Handle = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone, Default)]
pub struct KeyedLock {
    handles: Arc<Mutex<HashMap<String, Handle>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` while holding the lock for `key`.
    ///
    /// The lock is released and the key forgotten whether the action
    /// returns, fails, panics or is cancelled.
    pub async fn run_exclusively<F, Fut, T>(&self, key: &str, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let entry = Entry {
            owner: self,
            key,
            handle: self.handle_for(key),
        };
        // Declared after `entry`, so it is dropped first.
        let _guard = entry.handle.lock().await;
        action().await
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<String, Handle>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle_for(&self, key: &str) -> Handle {
        self.handles()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// One caller's claim on a key. Dropping it removes the map entry once no
/// other caller holds or waits on the same key.
struct Entry<'a> {
    owner: &'a KeyedLock,
    key: &'a str,
    handle: Handle,
}

impl Drop for Entry<'_> {
    fn drop(&mut self) {
        // Clones are only taken under the map lock, so the count is stable
        // here: one in the map, one in this entry.
        let mut handles = self.owner.handles();
        if Arc::strong_count(&self.handle) == 2 {
            handles.remove(self.key);
        }
    }
}
