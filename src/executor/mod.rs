//! Statement execution with the two cache tiers
//!
//! [`BaseExecutor`] runs statements against a [`Database`] and owns the
//! session-local statement cache. [`CachingExecutor`] decorates any executor
//! with the shared caches, buffering through one overlay per cache until the
//! unit of work ends.

pub mod base;
pub mod caching;
pub mod local_cache;

pub use base::BaseExecutor;
pub use caching::CachingExecutor;
pub use local_cache::{LocalCache, LocalEntry};

use crate::cache::CacheKey;
use crate::statement::{BoundSql, MappedStatement};
use crate::types::{Row, RowBounds, Value};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// The external execution primitive. Implementations report their own
/// failures as [`CacheError::Execution`](crate::CacheError::Execution).
pub trait Database: Send {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a write; returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait Executor: Send {
    fn query(&mut self, ms: &MappedStatement, params: &[Value], bounds: RowBounds) -> Result<Vec<Row>> {
        let bound_sql = ms.bound_sql(params);
        let key = self.create_cache_key(ms, bounds, &bound_sql);
        self.query_with_key(ms, bounds, key, &bound_sql)
    }

    fn query_with_key(
        &mut self,
        ms: &MappedStatement,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>>;

    fn update(&mut self, ms: &MappedStatement, params: &[Value]) -> Result<u64>;

    /// `required` also commits the underlying database.
    fn commit(&mut self, required: bool) -> Result<()>;

    fn rollback(&mut self, required: bool) -> Result<()>;

    fn create_cache_key(&self, ms: &MappedStatement, bounds: RowBounds, bound_sql: &BoundSql) -> CacheKey;

    /// Whether the statement cache holds `key`, completed or in progress.
    fn is_cached(&self, ms: &MappedStatement, key: &CacheKey) -> bool;

    /// Fill `slot` from the statement cache once `key` has completed.
    fn defer_load(&mut self, ms: &MappedStatement, key: CacheKey, slot: DeferredSlot) -> Result<()>;

    fn clear_local_cache(&mut self);

    fn close(&mut self, force_rollback: bool) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// A nested result that is filled in after the outermost query completes
#[derive(Debug, Clone, Default)]
pub struct DeferredSlot(Arc<Mutex<Option<Vec<Row>>>>);

impl DeferredSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill(&self, rows: Vec<Row>) {
        *self.0.lock() = Some(rows);
    }

    pub fn is_filled(&self) -> bool {
        self.0.lock().is_some()
    }

    pub fn get(&self) -> Option<Vec<Row>> {
        self.0.lock().clone()
    }
}

/// Result of a nested select issued during hydration
#[derive(Debug, Clone)]
pub enum NestedValue {
    Loaded(Vec<Row>),
    Deferred(DeferredSlot),
}

impl NestedValue {
    /// Rows available now; `None` while a deferred slot is still empty.
    pub fn rows(&self) -> Option<Vec<Row>> {
        match self {
            NestedValue::Loaded(rows) => Some(rows.clone()),
            NestedValue::Deferred(slot) => slot.get(),
        }
    }
}

/// Run a nested select from a [`RowMapper`](crate::statement::RowMapper).
///
/// A key already in the statement cache is not re-run: the value is
/// deferred, which also breaks cycles through in-progress queries.
pub fn load_nested(executor: &mut dyn Executor, ms: &MappedStatement, params: &[Value]) -> Result<NestedValue> {
    let bounds = RowBounds::default();
    let bound_sql = ms.bound_sql(params);
    let key = executor.create_cache_key(ms, bounds, &bound_sql);
    if executor.is_cached(ms, &key) {
        let slot = DeferredSlot::new();
        executor.defer_load(ms, key, slot.clone())?;
        return Ok(NestedValue::Deferred(slot));
    }
    executor
        .query_with_key(ms, bounds, key, &bound_sql)
        .map(NestedValue::Loaded)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_slot_shares_state() {
        let slot = DeferredSlot::new();
        let value = NestedValue::Deferred(slot.clone());
        assert!(value.rows().is_none());

        slot.fill(vec![vec![Value::Integer(1)]]);
        assert!(slot.is_filled());
        assert_eq!(value.rows(), Some(vec![vec![Value::Integer(1)]]));
    }
}
