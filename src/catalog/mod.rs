//! Catalog: settings, cache factories and the cache/statement registry
//!
//! One catalog is created per application and passed explicitly to whatever
//! opens sessions; there is no process-wide state.

pub mod registry;

pub use registry::CacheRegistry;

use crate::cache::{CacheBuilder, CacheFactoryRegistry, SharedCache};
use crate::config::{CacheConfig, Settings};
use crate::executor::{BaseExecutor, CachingExecutor, Database, Executor};
use crate::session::Session;
use crate::statement::MappedStatement;
use crate::Result;
use std::sync::Arc;

pub struct Catalog {
    settings: Settings,
    factories: CacheFactoryRegistry,
    registry: CacheRegistry,
}

impl Catalog {
    pub fn new(settings: Settings) -> Self {
        Self::with_factories(settings, CacheFactoryRegistry::new())
    }

    /// Catalog that can also assemble custom stores and decorators.
    pub fn with_factories(settings: Settings, factories: CacheFactoryRegistry) -> Self {
        Self {
            settings,
            factories,
            registry: CacheRegistry::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Assemble a cache from its configuration and register it.
    pub fn build_cache(&self, config: &CacheConfig) -> Result<SharedCache> {
        let cache = CacheBuilder::from_config(config).build(&self.factories)?;
        self.registry.add_cache(Arc::clone(&cache))?;
        Ok(cache)
    }

    pub fn cache(&self, id: &str) -> Option<SharedCache> {
        self.registry.get_cache(id)
    }

    pub fn add_statement(&self, statement: MappedStatement) -> Result<Arc<MappedStatement>> {
        self.registry.add_statement(statement)
    }

    pub fn statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.registry.get_statement(id)
    }

    /// Executor stack for one unit of work; the shared-cache coordinator is
    /// installed only when caching is enabled.
    pub fn new_executor(&self, database: Box<dyn Database>) -> Box<dyn Executor> {
        let executor = BaseExecutor::new(database, &self.settings);
        if self.settings.cache_enabled {
            Box::new(CachingExecutor::new(Box::new(executor)))
        } else {
            Box::new(executor)
        }
    }

    pub fn open_session(self: &Arc<Self>, database: Box<dyn Database>) -> Session {
        Session::new(Arc::clone(self), self.new_executor(database))
    }
}
