//! Unit-of-work façade over an executor stack
//!
//! A session tracks whether it wrote anything; the underlying database is
//! only committed or rolled back when it did, or when forced. Dropping a
//! session that was never closed closes it, rolling back pending work.
//!
//! Blocking caches tie a missed key to the thread that missed it, so a
//! session must be committed or rolled back on the thread that queried.

use crate::catalog::Catalog;
use crate::executor::Executor;
use crate::types::{Row, RowBounds, Value};
use crate::{CacheError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Session {
    catalog: Arc<Catalog>,
    executor: Box<dyn Executor>,
    dirty: bool,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>, executor: Box<dyn Executor>) -> Self {
        Self {
            catalog,
            executor,
            dirty: false,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn select_list(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.select_list_with_bounds(statement, params, RowBounds::default())
    }

    pub fn select_list_with_bounds(
        &mut self,
        statement: &str,
        params: &[Value],
        bounds: RowBounds,
    ) -> Result<Vec<Row>> {
        let ms = self.catalog.statement(statement)?;
        self.executor.query(&ms, params, bounds)
    }

    /// At most one row; more is an error.
    pub fn select_one(&mut self, statement: &str, params: &[Value]) -> Result<Option<Row>> {
        let mut rows = self.select_list(statement, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            found => Err(CacheError::TooManyResults {
                statement: statement.to_string(),
                found,
            }),
        }
    }

    pub fn insert(&mut self, statement: &str, params: &[Value]) -> Result<u64> {
        self.update(statement, params)
    }

    pub fn update(&mut self, statement: &str, params: &[Value]) -> Result<u64> {
        let ms = self.catalog.statement(statement)?;
        self.dirty = true;
        self.executor.update(&ms, params)
    }

    pub fn delete(&mut self, statement: &str, params: &[Value]) -> Result<u64> {
        self.update(statement, params)
    }

    pub fn commit(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.commit(required)?;
        debug!(required, "session committed");
        self.dirty = false;
        Ok(())
    }

    pub fn rollback(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.rollback(required)?;
        debug!(required, "session rolled back");
        self.dirty = false;
        Ok(())
    }

    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    /// Uncommitted work is rolled back.
    pub fn close(&mut self) -> Result<()> {
        let required = self.commit_or_rollback_required(false);
        let result = self.executor.close(required);
        self.dirty = false;
        result
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    fn commit_or_rollback_required(&self, force: bool) -> bool {
        self.dirty || force
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.executor.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, Settings};
    use crate::executor::test_support::MockDatabase;
    use crate::statement::MappedStatement;
    use std::sync::atomic::Ordering;

    const FIND: &str = "SELECT id FROM users WHERE id = ?";
    const ALL: &str = "SELECT id FROM users";

    fn catalog() -> Arc<Catalog> {
        let catalog = Catalog::new(Settings::default());
        let users = catalog.build_cache(&CacheConfig::new("users")).unwrap();
        catalog
            .add_statement(MappedStatement::select("users.find", FIND).cache(users.clone()))
            .unwrap();
        catalog
            .add_statement(MappedStatement::select("users.all", ALL))
            .unwrap();
        catalog
            .add_statement(MappedStatement::update("users.touch", "UPDATE users SET seen = 1").cache(users))
            .unwrap();
        Arc::new(catalog)
    }

    fn database() -> MockDatabase {
        let rows = vec![vec![Value::Integer(1)], vec![Value::Integer(2)]];
        MockDatabase::default().with(FIND, rows.clone()).with(ALL, rows)
    }

    #[test]
    fn test_select_one() {
        let catalog = catalog();
        let mut session = catalog.open_session(Box::new(database()));

        assert_eq!(session.select_one("users.find", &[Value::Integer(2)]).unwrap(), Some(vec![Value::Integer(2)]));
        assert_eq!(session.select_one("users.find", &[Value::Integer(9)]).unwrap(), None);
        assert!(matches!(
            session.select_one("users.all", &[]),
            Err(CacheError::TooManyResults { found: 2, .. })
        ));
        assert!(matches!(
            session.select_list("users.nope", &[]),
            Err(CacheError::StatementNotFound(_))
        ));
    }

    #[test]
    fn test_database_commit_only_when_dirty() {
        let catalog = catalog();
        let db = database();
        let mut session = catalog.open_session(Box::new(db.clone()));

        session.select_list("users.find", &[Value::Integer(1)]).unwrap();
        session.commit(false).unwrap();
        assert_eq!(db.commits.load(Ordering::SeqCst), 0);

        session.update("users.touch", &[]).unwrap();
        assert!(session.is_dirty());
        session.commit(false).unwrap();
        assert_eq!(db.commits.load(Ordering::SeqCst), 1);
        assert!(!session.is_dirty());

        session.commit(true).unwrap();
        assert_eq!(db.commits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_rolls_back_dirty_session() {
        let catalog = catalog();
        let db = database();
        {
            let mut session = catalog.open_session(Box::new(db.clone()));
            session.delete("users.touch", &[]).unwrap();
        }
        assert_eq!(db.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(db.commits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_closed_session() {
        let catalog = catalog();
        let mut session = catalog.open_session(Box::new(database()));
        session.close().unwrap();
        assert!(session.is_closed());
        assert!(matches!(
            session.select_list("users.find", &[Value::Integer(1)]),
            Err(CacheError::ExecutorClosed)
        ));
    }
}
