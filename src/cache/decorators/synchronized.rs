//! Coarse mutual exclusion around every operation
//!
//! Eviction layers update their own index and the inner cache as two steps;
//! one lock over the whole chain makes each operation atomic.

use crate::cache::{Cache, CacheKey, CacheStats, CacheValue};
use crate::Result;
use parking_lot::Mutex;

pub struct SynchronizedCache {
    inner: Box<dyn Cache>,
    lock: Mutex<()>,
}

impl SynchronizedCache {
    pub fn new(inner: Box<dyn Cache>) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

impl Cache for SynchronizedCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let _guard = self.lock.lock();
        self.inner.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let _guard = self.lock.lock();
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.clear()
    }

    fn size(&self) -> usize {
        let _guard = self.lock.lock();
        self.inner.size()
    }

    fn stats(&self) -> Option<CacheStats> {
        let _guard = self.lock.lock();
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::decorators::test_support::{key, rows};
    use crate::cache::decorators::{LruCache, StatsCache};
    use crate::cache::MapCache;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let lru = LruCache::with_capacity(Box::new(MapCache::new("sync")), 16);
        let cache = Arc::new(SynchronizedCache::new(Box::new(lru)));

        let mut handles = vec![];
        for t in 0..8 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let n = t * 1000 + i;
                    cache.put(key(n), rows(n)).unwrap();
                    cache.get(&key(n)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.size(), 16);
    }

    #[test]
    fn test_stats_pass_through() {
        let cache = SynchronizedCache::new(Box::new(StatsCache::new(Box::new(MapCache::new("sync")))));
        cache.get(&key(1)).unwrap();
        assert_eq!(cache.stats().unwrap().requests, 1);
    }
}
