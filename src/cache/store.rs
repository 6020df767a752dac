//! Map-backed base store with no eviction policy

use super::{Cache, CacheKey, CacheValue};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Unbounded store at the bottom of every built-in decorator chain
pub struct MapCache {
    id: String,
    entries: RwLock<HashMap<CacheKey, CacheValue>>,
}

impl MapCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl Cache for MapCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.entries.write().insert(key, value);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        Ok(self.entries.write().remove(key))
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn size(&self) -> usize {
        self.entries.read().len()
    }
}

impl std::fmt::Debug for MapCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCache")
            .field("id", &self.id)
            .field("size", &self.size())
            .finish()
    }
}
