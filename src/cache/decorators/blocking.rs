//! Per-key blocking on miss
//!
//! A `get` takes the key's lock before looking the key up. On a hit the lock
//! is released at once; on a miss the calling thread keeps it and must `put`
//! (or `remove`) the key, which releases it on every exit path. Other threads
//! asking for the same key wait, so at most one thread is ever populating a
//! given key.
//!
//! Locks are owned by a thread and re-entrant: a second `get` from the owner
//! does not block, and a single release frees the key. Lock entries are
//! reference counted and dropped from the table once nobody holds or waits
//! on them.

use super::parse_millis;
use crate::cache::{Cache, CacheKey, CacheStats, CacheValue};
use crate::{CacheError, Result};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    waiters: usize,
}

impl LockState {
    fn try_claim(&mut self, me: ThreadId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(me);
                true
            }
            Some(owner) => owner == me,
        }
    }
}

#[derive(Debug, Default)]
struct KeyLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl KeyLock {
    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.owner.is_none() && state.waiters == 0
    }
}

pub struct BlockingCache {
    inner: Box<dyn Cache>,
    timeout: Option<Duration>,
    locks: DashMap<CacheKey, Arc<KeyLock>>,
}

impl BlockingCache {
    /// `timeout = None` waits indefinitely.
    pub fn new(inner: Box<dyn Cache>, timeout: Option<Duration>) -> Self {
        Self {
            inner,
            timeout,
            locks: DashMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of keys currently locked or waited on.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    fn acquire_lock(&self, key: &CacheKey) -> Result<()> {
        // Register as a waiter while the table shard is held so the entry
        // cannot be discarded between lookup and wait.
        let lock = {
            let entry = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(KeyLock::default()));
            entry.state.lock().waiters += 1;
            Arc::clone(entry.value())
        };

        let me = thread::current().id();
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);

        let mut state = lock.state.lock();
        let acquired = loop {
            if state.try_claim(me) {
                break true;
            }
            trace!(cache = self.inner.id(), key = %key, "waiting for populating thread");
            match deadline {
                Some(deadline) => {
                    if lock.released.wait_until(&mut state, deadline).timed_out() {
                        break state.try_claim(me);
                    }
                }
                None => lock.released.wait(&mut state),
            }
        };
        state.waiters -= 1;
        drop(state);

        if acquired {
            return Ok(());
        }

        self.discard_if_idle(key);
        let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
        debug!(cache = self.inner.id(), key = %key, timeout_ms, "timed out waiting for cache lock");
        Err(CacheError::LockTimeout {
            cache: self.inner.id().to_string(),
            key: key.to_string(),
            timeout_ms,
        })
    }

    fn release_lock(&self, key: &CacheKey) {
        let lock = match self.locks.get(key) {
            Some(entry) => Arc::clone(entry.value()),
            None => return,
        };

        {
            let mut state = lock.state.lock();
            if state.owner != Some(thread::current().id()) {
                return;
            }
            state.owner = None;
        }
        lock.released.notify_all();
        self.discard_if_idle(key);
    }

    fn discard_if_idle(&self, key: &CacheKey) {
        self.locks.remove_if(key, |_, lock| lock.is_idle());
    }
}

impl Cache for BlockingCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        let result = self.inner.put(key.clone(), value);
        self.release_lock(&key);
        result
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.acquire_lock(key)?;
        match self.inner.get(key) {
            Ok(Some(value)) if !value.is_null() => {
                self.release_lock(key);
                Ok(Some(value))
            }
            // Miss: the caller now owns the key until it populates it.
            Ok(miss) => Ok(miss),
            Err(err) => {
                self.release_lock(key);
                Err(err)
            }
        }
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let result = self.inner.remove(key);
        self.release_lock(key);
        result
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<bool> {
        match name {
            "timeout" => {
                self.timeout = Some(parse_millis(name, value)?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn stats(&self) -> Option<CacheStats> {
        self.inner.stats()
    }
}
