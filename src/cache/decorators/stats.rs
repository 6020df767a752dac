//! Hit-ratio statistics
//!
//! The standard stack's logging layer: counts lookups and hits and reports
//! the running hit ratio at debug level.

use crate::cache::{Cache, CacheKey, CacheStats, CacheValue};
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct StatsCache {
    inner: Box<dyn Cache>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl StatsCache {
    pub fn new(inner: Box<dyn Cache>) -> Self {
        Self {
            inner,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / requests as f64
    }
}

impl Cache for StatsCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.inner.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.inner.get(key)?;
        if matches!(&value, Some(v) if !v.is_null()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        debug!(cache = self.inner.id(), hit_ratio = self.hit_ratio(), "cache hit ratio");
        Ok(value)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            size: self.inner.size(),
        })
    }
}
