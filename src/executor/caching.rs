//! Shared-cache coordinator
//!
//! Per select on a statement with a cache: flush the overlay first if the
//! statement requires it, then consult the overlay. A hit is returned as is;
//! a miss runs the inner executor and buffers the result. Buffered results
//! and clears reach the shared cache only when the inner executor has
//! committed.

use super::{DeferredSlot, Executor};
use crate::cache::{CacheKey, CacheValue, SharedCache, TransactionalCacheManager};
use crate::statement::{BoundSql, MappedStatement, StatementKind};
use crate::types::{Row, RowBounds, Value};
use crate::{CacheError, Result};
use tracing::{debug, trace, warn};

pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    tcm: TransactionalCacheManager,
}

impl CachingExecutor {
    pub fn new(delegate: Box<dyn Executor>) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::new(),
        }
    }

    /// Shared caches with buffered work in this unit of work.
    pub fn pending_caches(&self) -> usize {
        self.tcm.touched()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.delegate.is_closed() {
            return Err(CacheError::ExecutorClosed);
        }
        Ok(())
    }

    fn flush_cache_if_required(&mut self, ms: &MappedStatement) {
        if let Some(cache) = ms.shared_cache() {
            if ms.is_flush_cache_required() {
                trace!(cache = cache.id(), statement = ms.id(), "clear deferred to commit");
                self.tcm.clear(cache);
            }
        }
    }

    fn ensure_no_out_params(ms: &MappedStatement) -> Result<()> {
        if ms.kind() == StatementKind::Callable && ms.has_out_params() {
            return Err(CacheError::UnsupportedCaching(format!(
                "statement '{}' has OUT parameters; set useCache=false",
                ms.id()
            )));
        }
        Ok(())
    }

    fn cached_rows(&mut self, cache: &SharedCache, key: &CacheKey) -> Result<Option<Vec<Row>>> {
        match self.tcm.get_object(cache, key)? {
            None => Ok(None),
            Some(CacheValue::Rows(rows)) => Ok(Some(rows)),
            Some(other) => Err(CacheError::Config(format!(
                "cache '{}' holds {:?} for key {}; expected rows",
                cache.id(),
                other,
                key
            ))),
        }
    }
}

impl Executor for CachingExecutor {
    fn query_with_key(
        &mut self,
        ms: &MappedStatement,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let cache = match ms.shared_cache() {
            Some(cache) => cache,
            None => return self.delegate.query_with_key(ms, bounds, key, bound_sql),
        };

        self.flush_cache_if_required(ms);
        if !ms.is_use_cache() {
            return self.delegate.query_with_key(ms, bounds, key, bound_sql);
        }
        Self::ensure_no_out_params(ms)?;

        if let Some(rows) = self.cached_rows(cache, &key)? {
            debug!(cache = cache.id(), statement = ms.id(), "shared cache hit");
            return Ok(rows);
        }

        debug!(cache = cache.id(), statement = ms.id(), "shared cache miss");
        let rows = self.delegate.query_with_key(ms, bounds, key.clone(), bound_sql)?;
        self.tcm.put_object(cache, key, CacheValue::Rows(rows.clone()));
        Ok(rows)
    }

    fn update(&mut self, ms: &MappedStatement, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        self.flush_cache_if_required(ms);
        self.delegate.update(ms, params)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        self.tcm.commit()
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        let rolled_back = self.delegate.rollback(required);
        let overlays = self.tcm.rollback();
        rolled_back.and(overlays)
    }

    fn create_cache_key(&self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> CacheKey {
        self.delegate.create_cache_key(ms, bounds, bound_sql)
    }

    fn is_cached(&self, ms: &MappedStatement, key: &CacheKey) -> bool {
        self.delegate.is_cached(ms, key)
    }

    fn defer_load(&mut self, ms: &MappedStatement, key: CacheKey, slot: DeferredSlot) -> Result<()> {
        self.delegate.defer_load(ms, key, slot)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        // A forced rollback undoes the database work before the overlays.
        let (closed, overlays) = if force_rollback {
            let closed = self.delegate.close(true);
            (closed, self.tcm.rollback())
        } else {
            let overlays = self.tcm.commit();
            (self.delegate.close(false), overlays)
        };
        if let Err(err) = &overlays {
            warn!(error = %err, force_rollback, "failed to settle overlays on close");
        }
        closed.and(overlays)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }
}
