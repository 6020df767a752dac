//! Shared cache contract, base store, decorators and the transactional overlay
//!
//! A shared cache is a chain: a map-backed store at the bottom, one or more
//! eviction decorators, then the fixed standard stack built by
//! [`CacheBuilder`]. Every layer implements [`Cache`] and owns exactly one
//! inner `Box<dyn Cache>`.

pub mod builder;
pub mod decorators;
pub mod key;
pub mod manager;
pub mod store;
pub mod transactional;

pub use builder::{CacheBuilder, CacheFactoryRegistry};
pub use key::CacheKey;
pub use manager::TransactionalCacheManager;
pub use store::MapCache;
pub use transactional::TransactionalCache;

use crate::types::Row;
use crate::Result;
use std::any::Any;
use std::sync::Arc;

/// A cache shared by every session of a catalog
pub type SharedCache = Arc<dyn Cache>;

/// Key/value store contract implemented by the base store and every decorator.
///
/// All methods take `&self`; implementations synchronise internally. Layers
/// that keep private bookkeeping next to the inner cache rely on the
/// synchronized decorator above them to make the pair of updates atomic.
pub trait Cache: Send + Sync {
    /// Stable identity, normally the namespace the cache belongs to.
    fn id(&self) -> &str;

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()>;

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>>;

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>>;

    fn clear(&self) -> Result<()>;

    fn size(&self) -> usize;

    /// Apply a declarative setting. Returns `Ok(false)` when this layer does
    /// not expose a setting with that name.
    fn set_property(&mut self, _name: &str, _value: &str) -> Result<bool> {
        Ok(false)
    }

    /// Hit/miss statistics, when a statistics layer is part of the chain.
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Value stored in a shared cache
#[derive(Clone)]
pub enum CacheValue {
    /// A statement's result list
    Rows(Vec<Row>),

    /// Byte snapshot written by the copy-on-read decorator
    Serialized(Vec<u8>),

    /// Opaque in-process object; cannot be copied through serialization
    Handle(Arc<dyn Any + Send + Sync>),

    /// Miss placeholder; readers treat it as absent
    Null,
}

impl CacheValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CacheValue::Null)
    }

    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            CacheValue::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            CacheValue::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CacheValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheValue::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            CacheValue::Serialized(bytes) => write!(f, "Serialized(<{} bytes>)", bytes.len()),
            CacheValue::Handle(_) => write!(f, "Handle(..)"),
            CacheValue::Null => write!(f, "Null"),
        }
    }
}

impl PartialEq for CacheValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheValue::Rows(a), CacheValue::Rows(b)) => a == b,
            (CacheValue::Serialized(a), CacheValue::Serialized(b)) => a == b,
            (CacheValue::Handle(a), CacheValue::Handle(b)) => Arc::ptr_eq(a, b),
            (CacheValue::Null, CacheValue::Null) => true,
            _ => false,
        }
    }
}

impl From<Vec<Row>> for CacheValue {
    fn from(rows: Vec<Row>) -> Self {
        CacheValue::Rows(rows)
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    /// Total lookups
    pub requests: u64,
    /// Lookups that found a value
    pub hits: u64,
    /// Current number of entries
    pub size: usize,
}

impl CacheStats {
    pub fn misses(&self) -> u64 {
        self.requests - self.hits
    }

    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} entries, {:.1}% hit rate ({} hits, {} misses)",
            self.size,
            self.hit_rate() * 100.0,
            self.hits,
            self.misses()
        )
    }
}
