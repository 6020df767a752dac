//! Cache assembler
//!
//! Build order for the built-in store:
//!
//! ```text
//! store -> eviction decorator(s) -> [scheduled] -> [serialized] -> stats
//!       -> synchronized -> [blocking]
//! ```
//!
//! The serialized (copy-on-read) layer is installed only for `readOnly`
//! caches.
//!
//! Declarative properties are offered to every layer as it is added; a layer
//! that exposes a matching setting consumes it. A custom store registered by
//! name is only wrapped in the stats layer.

use super::decorators::{
    BlockingCache, FifoCache, LruCache, ScheduledCache, SerializedCache, StatsCache,
    SynchronizedCache, TieredCache,
};
use super::store::MapCache;
use super::{Cache, SharedCache};
use crate::config::CacheConfig;
use crate::{CacheError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Builds a base store from a cache id
pub type StoreFactory = Arc<dyn Fn(&str) -> Box<dyn Cache> + Send + Sync>;

/// Wraps a cache in a decorator
pub type DecoratorFactory = Arc<dyn Fn(Box<dyn Cache>) -> Box<dyn Cache> + Send + Sync>;

pub const DEFAULT_STORE: &str = "MAP";
pub const DEFAULT_EVICTION: &str = "LRU";

/// Named stores and decorators available to the assembler
#[derive(Clone)]
pub struct CacheFactoryRegistry {
    stores: HashMap<String, StoreFactory>,
    decorators: HashMap<String, DecoratorFactory>,
}

impl CacheFactoryRegistry {
    /// Registry with the built-in store and eviction decorators.
    pub fn new() -> Self {
        let mut registry = Self {
            stores: HashMap::new(),
            decorators: HashMap::new(),
        };
        registry.register_store(DEFAULT_STORE, |id| Box::new(MapCache::new(id)));
        registry.register_decorator("LRU", |inner| Box::new(LruCache::new(inner)));
        registry.register_decorator("FIFO", |inner| Box::new(FifoCache::new(inner)));
        registry.register_decorator("SOFT", |inner| Box::new(TieredCache::new(inner)));
        registry.register_decorator("TIERED", |inner| Box::new(TieredCache::new(inner)));
        registry
    }

    pub fn register_store<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&str) -> Box<dyn Cache> + Send + Sync + 'static,
    {
        self.stores.insert(name.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn register_decorator<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Box<dyn Cache>) -> Box<dyn Cache> + Send + Sync + 'static,
    {
        self.decorators.insert(name.to_ascii_uppercase(), Arc::new(factory));
    }

    fn store(&self, name: &str) -> Result<&StoreFactory> {
        self.stores
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| CacheError::Config(format!("unknown cache implementation '{}'", name)))
    }

    fn decorator(&self, name: &str) -> Result<&DecoratorFactory> {
        self.decorators
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| CacheError::Config(format!("unknown cache decorator '{}'", name)))
    }
}

impl Default for CacheFactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles one shared cache
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    id: String,
    implementation: Option<String>,
    decorators: Vec<String>,
    size: Option<usize>,
    clear_interval: Option<Duration>,
    copy_on_read: bool,
    blocking: bool,
    blocking_timeout: Option<Duration>,
    properties: BTreeMap<String, String>,
}

impl CacheBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            decorators: Vec::new(),
            size: None,
            clear_interval: None,
            copy_on_read: false,
            blocking: false,
            blocking_timeout: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let mut builder = Self::new(config.id.clone());
        builder.implementation = config.implementation.clone();
        builder.decorators = config.eviction.clone();
        builder.size = config.size;
        builder.clear_interval = config.flush_interval.map(Duration::from_millis);
        builder.copy_on_read = config.read_only;
        builder.blocking = config.blocking;
        builder.blocking_timeout = config.blocking_timeout.map(Duration::from_millis);
        builder.properties = config.properties.clone();
        builder
    }

    pub fn implementation(mut self, name: impl Into<String>) -> Self {
        self.implementation = Some(name.into());
        self
    }

    pub fn add_decorator(mut self, name: impl Into<String>) -> Self {
        self.decorators.push(name.into());
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn clear_interval(mut self, interval: Duration) -> Self {
        self.clear_interval = Some(interval);
        self
    }

    /// Hand out a fresh decoded copy on every read.
    pub fn copy_on_read(mut self, copy_on_read: bool) -> Self {
        self.copy_on_read = copy_on_read;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn build(&self, registry: &CacheFactoryRegistry) -> Result<SharedCache> {
        let store_name = self.implementation.as_deref().unwrap_or(DEFAULT_STORE);
        let builtin = store_name.eq_ignore_ascii_case(DEFAULT_STORE);

        let mut cache = (registry.store(store_name)?)(&self.id);
        if cache.id() != self.id {
            return Err(CacheError::Config(format!(
                "cache implementation '{}' built id '{}' instead of '{}'",
                store_name,
                cache.id(),
                self.id
            )));
        }

        let mut matched = BTreeSet::new();
        self.apply_properties(cache.as_mut(), &mut matched)?;

        if !builtin {
            for name in self.properties.keys().filter(|name| !matched.contains(name.as_str())) {
                warn!(cache = %self.id, property = %name, "custom cache ignored property");
            }
            let cache: Box<dyn Cache> = Box::new(StatsCache::new(cache));
            return Ok(Arc::from(cache));
        }

        let decorators: Vec<&str> = if self.decorators.is_empty() {
            vec![DEFAULT_EVICTION]
        } else {
            self.decorators.iter().map(String::as_str).collect()
        };
        for name in decorators {
            cache = (registry.decorator(name)?)(cache);
            self.apply_properties(cache.as_mut(), &mut matched)?;
        }

        if let Some(size) = self.size {
            if !cache.set_property("size", &size.to_string())? {
                warn!(cache = %self.id, size, "eviction policy has no size setting");
            }
        }

        cache = self.standard_decorators(cache, &mut matched)?;

        let unmatched: Vec<&str> = self
            .properties
            .keys()
            .map(String::as_str)
            .filter(|name| !matched.contains(*name))
            .collect();
        if !unmatched.is_empty() {
            return Err(CacheError::Config(format!(
                "cache '{}' has no setting for properties: {}",
                self.id,
                unmatched.join(", ")
            )));
        }

        debug!(
            cache = %self.id,
            copy_on_read = self.copy_on_read,
            blocking = self.blocking,
            "assembled cache"
        );
        Ok(Arc::from(cache))
    }

    fn standard_decorators(
        &self,
        mut cache: Box<dyn Cache>,
        matched: &mut BTreeSet<String>,
    ) -> Result<Box<dyn Cache>> {
        if let Some(interval) = self.clear_interval {
            cache = Box::new(ScheduledCache::new(cache, interval));
            self.apply_properties(cache.as_mut(), matched)?;
        }
        if self.copy_on_read {
            cache = Box::new(SerializedCache::new(cache));
        }
        cache = Box::new(StatsCache::new(cache));
        cache = Box::new(SynchronizedCache::new(cache));
        if self.blocking {
            cache = Box::new(BlockingCache::new(cache, self.blocking_timeout));
            self.apply_properties(cache.as_mut(), matched)?;
        }
        Ok(cache)
    }

    fn apply_properties(&self, cache: &mut dyn Cache, matched: &mut BTreeSet<String>) -> Result<()> {
        for (name, value) in &self.properties {
            if cache.set_property(name, value)? {
                matched.insert(name.clone());
            }
        }
        Ok(())
    }
}
