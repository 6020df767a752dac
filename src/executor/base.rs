//! Executor owning the database handle and the statement cache

use super::local_cache::{LocalCache, LocalEntry};
use super::{Database, DeferredSlot, Executor};
use crate::cache::CacheKey;
use crate::config::{LocalCacheScope, Settings};
use crate::statement::{BoundSql, MappedStatement};
use crate::types::{Row, RowBounds, Value};
use crate::{CacheError, Result};
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct DeferredLoad {
    key: CacheKey,
    slot: DeferredSlot,
}

impl DeferredLoad {
    fn can_load(&self, local: &LocalCache) -> bool {
        local.rows(&self.key).is_some()
    }

    fn load(&self, local: &LocalCache) {
        match local.rows(&self.key) {
            Some(rows) => self.slot.fill(rows.to_vec()),
            None => trace!(key = %self.key, "deferred value never completed"),
        }
    }
}

pub struct BaseExecutor {
    database: Box<dyn Database>,
    local_cache: LocalCache,
    deferred_loads: Vec<DeferredLoad>,
    local_cache_scope: LocalCacheScope,
    environment_id: Option<String>,
    query_stack: usize,
    closed: bool,
}

impl BaseExecutor {
    pub fn new(database: Box<dyn Database>, settings: &Settings) -> Self {
        Self {
            database,
            local_cache: LocalCache::new(),
            deferred_loads: Vec::new(),
            local_cache_scope: settings.local_cache_scope,
            environment_id: settings.environment_id.clone(),
            query_stack: 0,
            closed: false,
        }
    }

    pub fn local_cache(&self) -> &LocalCache {
        &self.local_cache
    }

    /// Depth of nested queries currently running.
    pub fn query_depth(&self) -> usize {
        self.query_stack
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CacheError::ExecutorClosed);
        }
        Ok(())
    }

    fn query_local_or_database(
        &mut self,
        ms: &MappedStatement,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        match self.local_cache.get(&key) {
            Some(LocalEntry::Rows(rows)) => {
                trace!(statement = ms.id(), key = %key, "statement cache hit");
                Ok(rows.clone())
            }
            Some(LocalEntry::InProgress) => Err(CacheError::QueryInProgress(key.to_string())),
            None => self.query_from_database(ms, bounds, key, bound_sql),
        }
    }

    fn query_from_database(
        &mut self,
        ms: &MappedStatement,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.local_cache.begin(key.clone());
        match self.run_select(ms, bounds, bound_sql) {
            Ok(rows) => {
                self.local_cache.complete(key, rows.clone());
                Ok(rows)
            }
            Err(err) => {
                self.local_cache.abort(&key);
                Err(err)
            }
        }
    }

    fn run_select(&mut self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> Result<Vec<Row>> {
        debug!(statement = ms.id(), depth = self.query_stack, "querying database");
        let rows = self.database.query(&bound_sql.sql, &bound_sql.parameters)?;
        let rows: Vec<Row> = rows.into_iter().skip(bounds.offset).take(bounds.limit).collect();
        match ms.mapper().map(Arc::clone) {
            Some(mapper) => mapper.map_rows(rows, self),
            None => Ok(rows),
        }
    }

    fn finish_top_level(&mut self, succeeded: bool) {
        let deferred = std::mem::take(&mut self.deferred_loads);
        if succeeded {
            for load in &deferred {
                load.load(&self.local_cache);
            }
        }
        if self.local_cache_scope == LocalCacheScope::Statement {
            self.local_cache.clear();
        }
    }
}

impl Executor for BaseExecutor {
    fn query_with_key(
        &mut self,
        ms: &MappedStatement,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.ensure_open()?;
        if self.query_stack == 0 && ms.is_flush_cache_required() {
            self.clear_local_cache();
        }

        self.query_stack += 1;
        let result = self.query_local_or_database(ms, bounds, key, bound_sql);
        self.query_stack -= 1;

        if self.query_stack == 0 {
            self.finish_top_level(result.is_ok());
        }
        result
    }

    fn update(&mut self, ms: &MappedStatement, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        self.clear_local_cache();
        let bound_sql = ms.bound_sql(params);
        debug!(statement = ms.id(), "executing update");
        self.database.execute(&bound_sql.sql, &bound_sql.parameters)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Err(CacheError::ExecutorClosed);
        }
        self.clear_local_cache();
        if required {
            self.database.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        if required {
            self.database.rollback()?;
        }
        Ok(())
    }

    fn create_cache_key(&self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(ms.id());
        key.update(bounds.offset as i64);
        key.update(bounds.limit as i64);
        key.update(bound_sql.sql.as_str());
        key.update_all(bound_sql.parameters.iter().cloned());
        if let Some(environment_id) = &self.environment_id {
            key.update(environment_id.as_str());
        }
        key
    }

    fn is_cached(&self, _ms: &MappedStatement, key: &CacheKey) -> bool {
        self.local_cache.contains(key)
    }

    fn defer_load(&mut self, ms: &MappedStatement, key: CacheKey, slot: DeferredSlot) -> Result<()> {
        self.ensure_open()?;
        let load = DeferredLoad { key, slot };
        if load.can_load(&self.local_cache) {
            load.load(&self.local_cache);
        } else {
            trace!(statement = ms.id(), key = %load.key, "deferring nested value");
            self.deferred_loads.push(load);
        }
        Ok(())
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
        }
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let rolled_back = self.rollback(force_rollback);
        let closed = self.database.close();
        self.closed = true;
        self.local_cache.clear();
        self.deferred_loads.clear();
        if let Err(err) = &rolled_back {
            warn!(error = %err, "rollback failed while closing executor");
        }
        rolled_back.and(closed)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
