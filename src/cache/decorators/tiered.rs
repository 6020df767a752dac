//! Two-tier retention: a strongly held hot ring over a bounded warm tier
//!
//! Without a garbage collector there is no reclaim-on-memory-pressure signal.
//! Entries instead live in a warm tier bounded by count (and optionally age).
//! Warm entries pushed out by the bound are queued as reclaimed and dropped
//! from the inner cache by [`TieredCache::drain_reclaimed`], which runs at the
//! start of every operation. Keys read while still warm are promoted into a
//! fixed-size hot ring and are never reclaimed while they sit there.

use super::{parse_capacity, parse_millis};
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

pub const DEFAULT_HOT_SIZE: usize = 256;
pub const DEFAULT_WARM_SIZE: usize = 4096;

struct TierState {
    hot: VecDeque<CacheKey>,
    hot_size: usize,
    warm: lru::LruCache<CacheKey, Instant>,
    warm_ttl: Option<Duration>,
    reclaimed: VecDeque<CacheKey>,
}

impl TierState {
    fn is_hot(&self, key: &CacheKey) -> bool {
        self.hot.contains(key)
    }

    fn admit_warm(&mut self, key: CacheKey) {
        if let Some((pushed_out, _)) = self.warm.push(key.clone(), Instant::now()) {
            if pushed_out != key {
                self.reclaimed.push_back(pushed_out);
            }
        }
    }

    fn promote(&mut self, key: CacheKey) {
        self.hot.push_front(key);
        while self.hot.len() > self.hot_size {
            if let Some(demoted) = self.hot.pop_back() {
                if !self.warm.contains(&demoted) {
                    self.admit_warm(demoted);
                }
            }
        }
    }

    /// Whether a warm entry is still retained; refreshes its recency.
    fn is_warm(&mut self, key: &CacheKey) -> bool {
        let ttl = self.warm_ttl;
        match self.warm.get(key) {
            Some(admitted) => ttl.map_or(true, |ttl| admitted.elapsed() < ttl),
            None => false,
        }
    }
}

pub struct TieredCache {
    inner: Box<dyn Cache>,
    state: Mutex<TierState>,
}

impl TieredCache {
    pub fn new(inner: Box<dyn Cache>) -> Self {
        Self::with_tiers(inner, DEFAULT_HOT_SIZE, DEFAULT_WARM_SIZE, None)
    }

    pub fn with_tiers(
        inner: Box<dyn Cache>,
        hot_size: usize,
        warm_size: usize,
        warm_ttl: Option<Duration>,
    ) -> Self {
        let warm_size = NonZeroUsize::new(warm_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            state: Mutex::new(TierState {
                hot: VecDeque::new(),
                hot_size,
                warm: lru::LruCache::new(warm_size),
                warm_ttl,
                reclaimed: VecDeque::new(),
            }),
        }
    }

    pub fn hot_size(&self) -> usize {
        self.state.lock().hot_size
    }

    /// Drop reclaimed entries from the inner cache. Keys that were promoted
    /// to the hot ring or re-admitted to the warm tier since are kept.
    pub fn drain_reclaimed(&self) -> Result<usize> {
        let mut state = self.state.lock();
        self.drain_locked(&mut state)
    }

    fn drain_locked(&self, state: &mut TierState) -> Result<usize> {
        let mut dropped = 0;
        while let Some(key) = state.reclaimed.pop_front() {
            if state.is_hot(&key) || state.warm.contains(&key) {
                continue;
            }
            self.inner.remove(&key)?;
            dropped += 1;
        }
        if dropped > 0 {
            trace!(cache = self.inner.id(), dropped, "dropped reclaimed entries");
        }
        Ok(dropped)
    }
}

impl Cache for TieredCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        let mut state = self.state.lock();
        self.drain_locked(&mut state)?;
        self.inner.put(key.clone(), value)?;
        state.admit_warm(key);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let mut state = self.state.lock();
        self.drain_locked(&mut state)?;

        let value = match self.inner.get(key)? {
            Some(value) => value,
            None => return Ok(None),
        };
        if state.is_hot(key) {
            return Ok(Some(value));
        }
        if state.is_warm(key) {
            state.promote(key.clone());
            return Ok(Some(value));
        }

        // Aged out or pushed out before the drain saw it: the entry dangles.
        state.warm.pop(key);
        self.inner.remove(key)?;
        Ok(None)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let mut state = self.state.lock();
        self.drain_locked(&mut state)?;
        state.hot.retain(|k| k != key);
        state.warm.pop(key);
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.hot.clear();
        state.warm.clear();
        state.reclaimed.clear();
        self.inner.clear()
    }

    fn size(&self) -> usize {
        let mut state = self.state.lock();
        if let Err(err) = self.drain_locked(&mut state) {
            warn!(cache = self.inner.id(), error = %err, "failed to drop reclaimed entries");
        }
        self.inner.size()
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<bool> {
        let mut state = self.state.lock();
        match name {
            "size" => {
                state.hot_size = parse_capacity(name, value)?;
                while state.hot.len() > state.hot_size {
                    if let Some(demoted) = state.hot.pop_back() {
                        state.admit_warm(demoted);
                    }
                }
                Ok(true)
            }
            "warmSize" => {
                let capacity = parse_capacity(name, value)?;
                while state.warm.len() > capacity {
                    if let Some((pushed_out, _)) = state.warm.pop_lru() {
                        state.reclaimed.push_back(pushed_out);
                    }
                }
                if let Some(capacity) = NonZeroUsize::new(capacity) {
                    state.warm.resize(capacity);
                }
                Ok(true)
            }
            "warmTtl" => {
                state.warm_ttl = Some(parse_millis(name, value)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
