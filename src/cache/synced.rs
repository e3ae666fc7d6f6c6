//! Mutex wrapper that makes the LRU store shareable across request handlers.

use std::sync::Mutex;
use std::time::Instant;

use super::lru::LruStore;
use super::view::ByteView;

/// A thread-safe cache front for one group.
///
/// The store is built lazily on the first insert, so a group that never sees
/// a write costs nothing beyond the mutex. The lock is held only around store
/// mutation, never across I/O.
pub struct SyncedCache {
    cache_bytes: usize,
    store: Mutex<Option<LruStore<ByteView>>>,
}

impl SyncedCache {
    pub fn new(cache_bytes: usize) -> Self {
        Self {
            cache_bytes,
            store: Mutex::new(None),
        }
    }

    pub fn add(&self, key: &str, value: ByteView, expire: Option<Instant>) {
        let mut guard = self.store.lock().expect("cache lock poisoned");
        guard
            .get_or_insert_with(|| LruStore::new(self.cache_bytes, None))
            .add(key, value, expire);
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut guard = self.store.lock().expect("cache lock poisoned");
        guard.as_mut()?.get(key).cloned()
    }

    /// Live entry count, zero if the store was never built.
    pub fn len(&self) -> usize {
        let guard = self.store.lock().expect("cache lock poisoned");
        guard.as_ref().map_or(0, |store| store.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
