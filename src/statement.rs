//! Mapped statement metadata
//!
//! SQL generation and row hydration are external. A statement only carries
//! what the caching layers need: its id, its kind, a [`SqlSource`] producing
//! the final SQL and bound parameters, the two caching flags and the shared
//! cache of its namespace.

use crate::cache::SharedCache;
use crate::executor::Executor;
use crate::types::{Row, Value};
use crate::Result;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Stored procedure call
    Callable,
}

impl StatementKind {
    pub fn is_select(&self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

/// Final SQL text plus the parameters bound to it, in declared order
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    pub sql: String,
    pub parameters: Vec<Value>,
}

/// Turns call parameters into executable SQL.
pub trait SqlSource: Send + Sync {
    fn bound_sql(&self, params: &[Value]) -> BoundSql;
}

/// SQL text fixed at registration; every parameter is bound as given.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
}

impl StaticSqlSource {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, params: &[Value]) -> BoundSql {
        BoundSql {
            sql: self.sql.clone(),
            parameters: params.to_vec(),
        }
    }
}

/// Hydration hook run on the raw rows of a select.
///
/// `executor` is the session-local executor; nested selects issued through
/// it see the statement cache, including in-progress entries.
pub trait RowMapper: Send + Sync {
    fn map_rows(&self, rows: Vec<Row>, executor: &mut dyn Executor) -> Result<Vec<Row>>;
}

pub struct MappedStatement {
    id: String,
    kind: StatementKind,
    sql_source: Arc<dyn SqlSource>,
    use_cache: bool,
    flush_cache_required: bool,
    has_out_params: bool,
    cache: Option<SharedCache>,
    row_mapper: Option<Arc<dyn RowMapper>>,
}

impl MappedStatement {
    /// Selects use the shared cache; every other kind flushes it.
    pub fn new(id: impl Into<String>, kind: StatementKind, sql_source: Arc<dyn SqlSource>) -> Self {
        Self {
            id: id.into(),
            kind,
            sql_source,
            use_cache: kind.is_select(),
            flush_cache_required: !kind.is_select(),
            has_out_params: false,
            cache: None,
            row_mapper: None,
        }
    }

    pub fn select(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(id, StatementKind::Select, Arc::new(StaticSqlSource::new(sql)))
    }

    pub fn update(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(id, StatementKind::Update, Arc::new(StaticSqlSource::new(sql)))
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn flush_cache(mut self, flush: bool) -> Self {
        self.flush_cache_required = flush;
        self
    }

    pub fn out_params(mut self, has_out_params: bool) -> Self {
        self.has_out_params = has_out_params;
        self
    }

    pub fn cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn row_mapper(mut self, mapper: Arc<dyn RowMapper>) -> Self {
        self.row_mapper = Some(mapper);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn is_use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn is_flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    pub fn has_out_params(&self) -> bool {
        self.has_out_params
    }

    pub fn shared_cache(&self) -> Option<&SharedCache> {
        self.cache.as_ref()
    }

    pub fn mapper(&self) -> Option<&Arc<dyn RowMapper>> {
        self.row_mapper.as_ref()
    }

    pub fn bound_sql(&self, params: &[Value]) -> BoundSql {
        self.sql_source.bound_sql(params)
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("use_cache", &self.use_cache)
            .field("flush_cache_required", &self.flush_cache_required)
            .field("cache", &self.cache.as_ref().map(|cache| cache.id().to_string()))
            .finish()
    }
}
