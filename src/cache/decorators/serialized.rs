//! Copy-on-read transport
//!
//! Result lists are stored as bincode snapshots and decoded into a fresh copy
//! on every read, so no two callers ever share a mutable value.

use crate::cache::{Cache, CacheKey, CacheValue};
use crate::types::Row;
use crate::{CacheError, Result};

pub struct SerializedCache {
    inner: Box<dyn Cache>,
}

impl SerializedCache {
    pub fn new(inner: Box<dyn Cache>) -> Self {
        Self { inner }
    }

    fn encode(&self, value: CacheValue) -> Result<CacheValue> {
        match value {
            CacheValue::Rows(rows) => Ok(CacheValue::Serialized(bincode::serialize(&rows)?)),
            CacheValue::Null => Ok(CacheValue::Null),
            CacheValue::Serialized(bytes) => Ok(CacheValue::Serialized(bytes)),
            CacheValue::Handle(_) => Err(CacheError::NotSerializable(format!(
                "cache '{}' copies values on read; in-process handles cannot be stored",
                self.inner.id()
            ))),
        }
    }

    fn decode(&self, value: CacheValue) -> Result<CacheValue> {
        match value {
            CacheValue::Serialized(bytes) => {
                let rows: Vec<Row> = bincode::deserialize(&bytes)?;
                Ok(CacheValue::Rows(rows))
            }
            CacheValue::Null => Ok(CacheValue::Null),
            other => Err(CacheError::Serialization(format!(
                "cache '{}' holds an unencoded value: {:?}",
                self.inner.id(),
                other
            ))),
        }
    }
}

impl Cache for SerializedCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        // Encode first: a value that cannot be copied leaves the cache untouched.
        let encoded = self.encode(value)?;
        self.inner.put(key, encoded)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.inner.get(key)?.map(|value| self.decode(value)).transpose()
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.inner.remove(key)?.map(|value| self.decode(value)).transpose()
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}
