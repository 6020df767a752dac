use mapper_cache::cache::CacheValue;
use mapper_cache::executor::{load_nested, NestedValue};
use mapper_cache::statement::RowMapper;
use mapper_cache::{
    CacheConfig, CacheError, Catalog, Database, Executor, MappedStatement, Result, Row, Settings, Value,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

const FIND_USER: &str = "SELECT id, manager FROM users WHERE id = ?";
const RENAME_USER: &str = "UPDATE users SET name = ? WHERE id = ?";

/// Table of canned rows keyed by SQL; counts every query that reaches it.
#[derive(Clone, Default)]
struct CountingDatabase {
    tables: Arc<HashMap<String, Vec<Row>>>,
    executions: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingDatabase {
    fn users() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            FIND_USER.to_string(),
            vec![user(1, 2), user(2, 1), user(3, 3), user(4, 1)],
        );
        Self {
            tables: Arc::new(tables),
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Database for CountingDatabase {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let rows = self
            .tables
            .get(sql)
            .ok_or_else(|| CacheError::Execution(format!("no such table for: {}", sql)))?;
        Ok(rows
            .iter()
            .filter(|row| params.first().map_or(true, |id| row.first() == Some(id)))
            .cloned()
            .collect())
    }

    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<u64> {
        Ok(1)
    }
}

fn user(id: i64, manager: i64) -> Row {
    vec![Value::Integer(id), Value::Integer(manager)]
}

fn catalog_with(settings: Settings, config: CacheConfig) -> Arc<Catalog> {
    let catalog = Catalog::new(settings);
    let users = catalog.build_cache(&config).unwrap();
    catalog
        .add_statement(MappedStatement::select("users.find", FIND_USER).cache(users.clone()))
        .unwrap();
    catalog
        .add_statement(MappedStatement::update("users.rename", RENAME_USER).cache(users))
        .unwrap();
    Arc::new(catalog)
}

fn catalog() -> Arc<Catalog> {
    catalog_with(Settings::default(), CacheConfig::new("users"))
}

#[test]
fn test_committed_result_serves_next_session() {
    let catalog = catalog();
    let db = CountingDatabase::users();

    for _ in 0..2 {
        let mut session = catalog.open_session(Box::new(db.clone()));
        let rows = session.select_list("users.find", &[Value::Integer(1)]).unwrap();
        assert_eq!(rows, vec![user(1, 2)]);
        session.commit(false).unwrap();
    }
    assert_eq!(db.executions(), 1);
}

#[test]
fn test_committed_flush_forces_reexecution() {
    let catalog = catalog();
    let db = CountingDatabase::users();

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(1)]).unwrap();
    session.commit(false).unwrap();

    let mut writer = catalog.open_session(Box::new(db.clone()));
    writer.update("users.rename", &[Value::from("ada"), Value::Integer(1)]).unwrap();
    writer.commit(false).unwrap();

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(1)]).unwrap();
    session.commit(false).unwrap();
    assert_eq!(db.executions(), 2);
}

#[test]
fn test_rolled_back_flush_keeps_cache() {
    let catalog = catalog();
    let db = CountingDatabase::users();

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(1)]).unwrap();
    session.commit(false).unwrap();

    let mut writer = catalog.open_session(Box::new(db.clone()));
    writer.update("users.rename", &[Value::from("ada"), Value::Integer(1)]).unwrap();
    writer.rollback(false).unwrap();

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(1)]).unwrap();
    assert_eq!(db.executions(), 1);
}

#[test]
fn test_uncommitted_result_invisible_to_other_sessions() {
    let catalog = catalog();
    let db = CountingDatabase::users();

    let mut first = catalog.open_session(Box::new(db.clone()));
    let mut second = catalog.open_session(Box::new(db.clone()));
    first.select_list("users.find", &[Value::Integer(2)]).unwrap();
    second.select_list("users.find", &[Value::Integer(2)]).unwrap();
    assert_eq!(db.executions(), 2);

    first.commit(false).unwrap();
    second.commit(false).unwrap();

    let mut third = catalog.open_session(Box::new(db.clone()));
    third.select_list("users.find", &[Value::Integer(2)]).unwrap();
    assert_eq!(db.executions(), 2);
}

#[test]
fn test_local_cache_within_session() {
    let catalog = catalog_with(Settings::local_only(), CacheConfig::new("users"));
    let db = CountingDatabase::users();

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(3)]).unwrap();
    session.select_list("users.find", &[Value::Integer(3)]).unwrap();
    assert_eq!(db.executions(), 1);

    session.clear_cache();
    session.select_list("users.find", &[Value::Integer(3)]).unwrap();
    assert_eq!(db.executions(), 2);
    session.commit(false).unwrap();

    // Shared caching is off: nothing was published.
    assert_eq!(catalog.cache("users").map(|cache| cache.size()), Some(0));
}

#[test]
fn test_statement_scope_disables_memoization() {
    let settings = Settings {
        cache_enabled: false,
        ..Settings::for_statement_scope()
    };
    let catalog = catalog_with(settings, CacheConfig::new("users"));
    let db = CountingDatabase::users();

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(3)]).unwrap();
    session.select_list("users.find", &[Value::Integer(3)]).unwrap();
    assert_eq!(db.executions(), 2);
}

#[test]
fn test_lru_capacity_two() {
    let catalog = catalog_with(Settings::default(), CacheConfig::new("users").size(2));
    let db = CountingDatabase::users();

    for id in [1, 2, 3] {
        let mut session = catalog.open_session(Box::new(db.clone()));
        session.select_list("users.find", &[Value::Integer(id)]).unwrap();
        session.commit(false).unwrap();
    }
    assert_eq!(db.executions(), 3);

    let mut session = catalog.open_session(Box::new(db.clone()));
    session.select_list("users.find", &[Value::Integer(3)]).unwrap();
    session.select_list("users.find", &[Value::Integer(2)]).unwrap();
    assert_eq!(db.executions(), 3);
    session.select_list("users.find", &[Value::Integer(1)]).unwrap();
    assert_eq!(db.executions(), 4);
}

#[test]
fn test_blocking_cache_single_execution_across_threads() {
    let config = CacheConfig::new("users").blocking(None);
    let catalog = catalog_with(Settings::default(), config);
    let db = CountingDatabase::users().with_delay(Duration::from_millis(30));
    let barrier = Arc::new(Barrier::new(2));

    let populate = {
        let catalog = catalog.clone();
        let db = db.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let mut session = catalog.open_session(Box::new(db));
            let rows = session.select_list("users.find", &[Value::Integer(4)]).unwrap();
            barrier.wait();
            thread::sleep(Duration::from_millis(30));
            session.commit(false).unwrap();
            rows
        })
    };

    let wait = {
        let catalog = catalog.clone();
        let db = db.clone();
        thread::spawn(move || {
            barrier.wait();
            let mut session = catalog.open_session(Box::new(db));
            let rows = session.select_list("users.find", &[Value::Integer(4)]).unwrap();
            session.commit(false).unwrap();
            rows
        })
    };

    assert_eq!(populate.join().unwrap(), vec![user(4, 1)]);
    assert_eq!(wait.join().unwrap(), vec![user(4, 1)]);
    assert_eq!(db.executions(), 1);
}

#[test]
fn test_blocking_timeout_is_a_cache_error() {
    let config = CacheConfig::new("users").blocking(Some(20));
    let catalog = catalog_with(Settings::default(), config);
    let db = CountingDatabase::users();

    let mut holder = catalog.open_session(Box::new(db.clone()));
    holder.select_list("users.find", &[Value::Integer(1)]).unwrap();

    let err = {
        let catalog = catalog.clone();
        let db = db.clone();
        thread::spawn(move || {
            let mut session = catalog.open_session(Box::new(db));
            session
                .select_list("users.find", &[Value::Integer(1)])
                .unwrap_err()
        })
        .join()
        .unwrap()
    };
    assert!(err.is_cache_error());
    assert!(err.is_retryable());
    assert_eq!(db.executions(), 1);

    holder.commit(false).unwrap();
}

#[test]
fn test_read_only_cache_rejects_handles() {
    let catalog = catalog_with(Settings::default(), CacheConfig::new("users").read_only(true));
    let cache = catalog.cache("users").unwrap();
    let key = mapper_cache::CacheKey::from_values([Value::Integer(1)]);
    let handle: Arc<dyn Any + Send + Sync> = Arc::new(5u8);

    let err = cache.put(key.clone(), CacheValue::Handle(handle)).unwrap_err();
    assert!(matches!(err, CacheError::NotSerializable(_)));
    assert!(cache.get(&key).unwrap().is_none());
}

/// Loads each user's manager through the same statement.
struct ManagerMapper {
    find: Mutex<Option<Arc<MappedStatement>>>,
    managers: Mutex<Vec<NestedValue>>,
}

impl RowMapper for ManagerMapper {
    fn map_rows(&self, rows: Vec<Row>, executor: &mut dyn Executor) -> Result<Vec<Row>> {
        let find = self.find.lock().unwrap().clone();
        if let Some(find) = find {
            for row in &rows {
                let manager = load_nested(executor, &find, &[row[1].clone()])?;
                self.managers.lock().unwrap().push(manager);
            }
        }
        Ok(rows)
    }
}

#[test]
fn test_recursive_mapping_through_session() {
    let catalog = Arc::new(Catalog::new(Settings::default()));
    let users = catalog.build_cache(&CacheConfig::new("users")).unwrap();
    let mapper = Arc::new(ManagerMapper {
        find: Mutex::new(None),
        managers: Mutex::new(Vec::new()),
    });
    let find = catalog
        .add_statement(
            MappedStatement::select("users.withManager", FIND_USER)
                .cache(users)
                .row_mapper(mapper.clone()),
        )
        .unwrap();
    *mapper.find.lock().unwrap() = Some(find);

    let db = CountingDatabase::users();
    let mut session = catalog.open_session(Box::new(db.clone()));
    let rows = session.select_list("users.withManager", &[Value::Integer(1)]).unwrap();
    assert_eq!(rows, vec![user(1, 2)]);
    // 1 -> 2 -> 1 stops at the in-progress query for 1.
    assert_eq!(db.executions(), 2);

    {
        let managers = mapper.managers.lock().unwrap();
        assert_eq!(managers.len(), 2);
        assert_eq!(managers[0].rows(), Some(vec![user(1, 2)]));
        assert_eq!(managers[1].rows(), Some(vec![user(2, 1)]));
    }

    session.commit(false).unwrap();
    *mapper.find.lock().unwrap() = None;
}
