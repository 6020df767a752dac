/// Registry of shared caches and mapped statements
use crate::cache::SharedCache;
use crate::statement::MappedStatement;
use crate::{CacheError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct RegistryMetadata {
    /// Cache id -> cache
    caches: HashMap<String, SharedCache>,
    /// Statement id -> statement
    statements: HashMap<String, Arc<MappedStatement>>,
}

/// Caches and statements by id; ids are unique within a registry
#[derive(Default)]
pub struct CacheRegistry {
    metadata: RwLock<RegistryMetadata>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared cache
    pub fn add_cache(&self, cache: SharedCache) -> Result<()> {
        let mut meta = self.metadata.write();
        if meta.caches.contains_key(cache.id()) {
            return Err(CacheError::Config(format!(
                "Cache '{}' already exists",
                cache.id()
            )));
        }
        debug!(cache = cache.id(), "registered cache");
        meta.caches.insert(cache.id().to_string(), cache);
        Ok(())
    }

    /// Unregister a cache. Statements already bound to it keep using it.
    pub fn remove_cache(&self, id: &str) -> Result<SharedCache> {
        self.metadata
            .write()
            .caches
            .remove(id)
            .ok_or_else(|| CacheError::Config(format!("Cache '{}' not found", id)))
    }

    pub fn get_cache(&self, id: &str) -> Option<SharedCache> {
        self.metadata.read().caches.get(id).cloned()
    }

    pub fn has_cache(&self, id: &str) -> bool {
        self.metadata.read().caches.contains_key(id)
    }

    /// Cache ids in sorted order
    pub fn cache_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.metadata.read().caches.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register a mapped statement
    pub fn add_statement(&self, statement: MappedStatement) -> Result<Arc<MappedStatement>> {
        let mut meta = self.metadata.write();
        if meta.statements.contains_key(statement.id()) {
            return Err(CacheError::Config(format!(
                "Mapped statement '{}' already exists",
                statement.id()
            )));
        }
        let statement = Arc::new(statement);
        meta.statements
            .insert(statement.id().to_string(), Arc::clone(&statement));
        Ok(statement)
    }

    pub fn get_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.metadata
            .read()
            .statements
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::StatementNotFound(id.to_string()))
    }

    pub fn has_statement(&self, id: &str) -> bool {
        self.metadata.read().statements.contains_key(id)
    }

    /// Clear every registered cache. The first failure is returned after
    /// all caches were attempted.
    pub fn clear_caches(&self) -> Result<()> {
        let caches: Vec<SharedCache> = self.metadata.read().caches.values().cloned().collect();
        let mut first_error = None;
        for cache in caches {
            if let Err(err) = cache.clear() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
