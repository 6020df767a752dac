//! Overlays touched by one unit of work
//!
//! Overlays are created lazily, one per shared cache, and keyed by the
//! cache's allocation address. Each overlay holds a `Weak` to its cache, so
//! the address cannot be reused while the overlay is alive.

use super::{CacheKey, CacheValue, SharedCache, TransactionalCache};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
pub struct TransactionalCacheManager {
    overlays: HashMap<usize, TransactionalCache>,
}

fn cache_identity(cache: &SharedCache) -> usize {
    Arc::as_ptr(cache) as *const () as usize
}

impl TransactionalCacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn overlay(&mut self, cache: &SharedCache) -> &mut TransactionalCache {
        self.overlays.entry(cache_identity(cache)).or_insert_with(|| {
            trace!(cache = cache.id(), "opened overlay");
            TransactionalCache::new(cache)
        })
    }

    pub fn clear(&mut self, cache: &SharedCache) {
        self.overlay(cache).clear();
    }

    pub fn get_object(&mut self, cache: &SharedCache, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.overlay(cache).get(key)
    }

    pub fn put_object(&mut self, cache: &SharedCache, key: CacheKey, value: CacheValue) {
        self.overlay(cache).put(key, value);
    }

    /// Number of shared caches touched since the last commit or rollback.
    pub fn touched(&self) -> usize {
        self.overlays.len()
    }

    /// Commit every overlay. All overlays are processed even if one fails;
    /// the first error is returned.
    pub fn commit(&mut self) -> Result<()> {
        let mut first_error = None;
        for overlay in self.overlays.values_mut() {
            if let Err(err) = overlay.commit() {
                first_error.get_or_insert(err);
            }
        }
        self.overlays.clear();
        first_error.map_or(Ok(()), Err)
    }

    pub fn rollback(&mut self) -> Result<()> {
        let mut first_error = None;
        for overlay in self.overlays.values_mut() {
            if let Err(err) = overlay.rollback() {
                first_error.get_or_insert(err);
            }
        }
        self.overlays.clear();
        first_error.map_or(Ok(()), Err)
    }
}
