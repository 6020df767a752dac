//! Least-recently-used eviction
//!
//! Keeps an access-ordered key index next to the inner cache. Every `get`
//! and `put` touches the key; once the index exceeds its capacity the least
//! recently used key is removed from the index and the inner cache together.

use super::{parse_capacity, DEFAULT_CAPACITY};
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::Result;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use tracing::trace;

pub struct LruCache {
    inner: Box<dyn Cache>,
    index: Mutex<lru::LruCache<CacheKey, ()>>,
}

impl LruCache {
    pub fn new(inner: Box<dyn Cache>) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: Box<dyn Cache>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            index: Mutex::new(lru::LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.index.lock().cap().get()
    }

    fn resize(&self, capacity: usize) -> Result<()> {
        let mut index = self.index.lock();
        while index.len() > capacity {
            if let Some((evicted, _)) = index.pop_lru() {
                self.inner.remove(&evicted)?;
            }
        }
        if let Some(capacity) = NonZeroUsize::new(capacity) {
            index.resize(capacity);
        }
        Ok(())
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.inner.put(key.clone(), value)?;

        let mut index = self.index.lock();
        if let Some((evicted, _)) = index.push(key.clone(), ()) {
            // `push` hands back the replaced entry when the key was present.
            if evicted != key {
                trace!(cache = self.inner.id(), key = %evicted, "evicted least recently used entry");
                self.inner.remove(&evicted)?;
            }
        }
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.index.lock().get(key);
        self.inner.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.index.lock().pop(key);
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.index.lock().clear();
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<bool> {
        match name {
            "size" => {
                self.resize(parse_capacity(name, value)?)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
