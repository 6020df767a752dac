//! First-in-first-out eviction

use super::{parse_capacity, DEFAULT_CAPACITY};
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::Result;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tracing::trace;

struct FifoState {
    queue: VecDeque<CacheKey>,
    members: HashSet<CacheKey>,
    capacity: usize,
}

impl FifoState {
    /// Queue a new key; returns the heads pushed out by the capacity bound.
    fn admit(&mut self, key: CacheKey) -> Vec<CacheKey> {
        if self.members.insert(key.clone()) {
            self.queue.push_back(key);
        }
        self.trim()
    }

    fn trim(&mut self) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while self.queue.len() > self.capacity {
            if let Some(head) = self.queue.pop_front() {
                self.members.remove(&head);
                evicted.push(head);
            }
        }
        evicted
    }
}

/// Insertion-ordered eviction; reads never reorder the queue.
pub struct FifoCache {
    inner: Box<dyn Cache>,
    state: Mutex<FifoState>,
}

impl FifoCache {
    pub fn new(inner: Box<dyn Cache>) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(FifoState {
                queue: VecDeque::new(),
                members: HashSet::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }
}

impl Cache for FifoCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.inner.put(key.clone(), value)?;

        let evicted = self.state.lock().admit(key);
        for head in evicted {
            trace!(cache = self.inner.id(), key = %head, "evicted oldest entry");
            self.inner.remove(&head)?;
        }
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.inner.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        {
            let mut state = self.state.lock();
            if state.members.remove(key) {
                state.queue.retain(|k| k != key);
            }
        }
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.queue.clear();
            state.members.clear();
        }
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<bool> {
        match name {
            "size" => {
                let capacity = parse_capacity(name, value)?;
                let evicted = {
                    let mut state = self.state.lock();
                    state.capacity = capacity;
                    state.trim()
                };
                for head in evicted {
                    self.inner.remove(&head)?;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
