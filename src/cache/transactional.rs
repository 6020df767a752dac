//! Per-session buffering overlay over one shared cache
//!
//! Reads go straight to the shared cache; writes are buffered until commit.
//! A clear only raises `clear_on_commit`, so a rollback can still undo it.
//! Every key that missed is remembered. On commit a miss placeholder is
//! written for each one that was not populated; on rollback each one is
//! removed, so the shared cache loses no capacity to a discarded unit of
//! work. Both paths release a blocking decorator's per-key lock held by this
//! session.

use super::{Cache, CacheKey, CacheValue, SharedCache};
use crate::{CacheError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub struct TransactionalCache {
    id: String,
    delegate: Weak<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CacheValue>,
    entries_missed_in_cache: HashSet<CacheKey>,
}

impl TransactionalCache {
    pub fn new(delegate: &SharedCache) -> Self {
        Self {
            id: delegate.id().to_string(),
            delegate: Arc::downgrade(delegate),
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
            entries_missed_in_cache: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_clear_on_commit(&self) -> bool {
        self.clear_on_commit
    }

    pub fn pending_writes(&self) -> usize {
        self.entries_to_add_on_commit.len()
    }

    pub fn missed_keys(&self) -> usize {
        self.entries_missed_in_cache.len()
    }

    fn delegate(&self) -> Result<SharedCache> {
        self.delegate.upgrade().ok_or_else(|| {
            CacheError::CacheUnavailable(format!(
                "cache '{}' was dropped before the unit of work ended",
                self.id
            ))
        })
    }

    /// Read through to the shared cache. Pending writes are never visible,
    /// not even to this session.
    pub fn get(&mut self, key: &CacheKey) -> Result<Option<CacheValue>> {
        let value = self.delegate()?.get(key)?.filter(|value| !value.is_null());
        if value.is_none() {
            self.entries_missed_in_cache.insert(key.clone());
        }
        if self.clear_on_commit {
            return Ok(None);
        }
        Ok(value)
    }

    pub fn put(&mut self, key: CacheKey, value: CacheValue) {
        self.entries_to_add_on_commit.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
    }

    pub fn commit(&mut self) -> Result<()> {
        let result = self.delegate().and_then(|delegate| {
            if self.clear_on_commit {
                if let Err(err) = delegate.clear() {
                    // Nothing is published, but missed keys must still be released.
                    if let Err(release) = self.remove_missed_entries(delegate.as_ref()) {
                        warn!(cache = %self.id, error = %release, "failed to release missed entries");
                    }
                    return Err(err);
                }
            }
            self.flush_pending_entries(delegate.as_ref())
        });
        debug!(
            cache = %self.id,
            writes = self.entries_to_add_on_commit.len(),
            cleared = self.clear_on_commit,
            ok = result.is_ok(),
            "committed overlay"
        );
        self.reset();
        result
    }

    pub fn rollback(&mut self) -> Result<()> {
        let result = self
            .delegate()
            .and_then(|delegate| self.remove_missed_entries(delegate.as_ref()));
        debug!(cache = %self.id, discarded = self.entries_to_add_on_commit.len(), "rolled back overlay");
        self.reset();
        result
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
        self.entries_missed_in_cache.clear();
    }

    fn flush_pending_entries(&self, delegate: &dyn Cache) -> Result<()> {
        let mut first_error = None;
        for (key, value) in &self.entries_to_add_on_commit {
            if let Err(err) = delegate.put(key.clone(), value.clone()) {
                first_error.get_or_insert(err);
            }
        }
        for key in &self.entries_missed_in_cache {
            if self.entries_to_add_on_commit.contains_key(key) {
                continue;
            }
            if let Err(err) = delegate.put(key.clone(), CacheValue::Null) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn remove_missed_entries(&self, delegate: &dyn Cache) -> Result<()> {
        let mut first_error = None;
        for key in &self.entries_missed_in_cache {
            if let Err(err) = delegate.remove(key) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::decorators::test_support::{key, rows};
    use crate::cache::decorators::{BlockingCache, LruCache, SynchronizedCache};
    use crate::cache::MapCache;
    use std::thread;
    use std::time::Duration;

    fn shared() -> SharedCache {
        Arc::new(MapCache::new("users"))
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let cache = shared();
        let mut overlay = TransactionalCache::new(&cache);

        overlay.put(key(1), rows(1));
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(overlay.get(&key(1)).unwrap().is_none());

        overlay.commit().unwrap();
        assert_eq!(cache.get(&key(1)).unwrap(), Some(rows(1)));
    }

    #[test]
    fn test_rollback_leaves_cache_unchanged() {
        let cache = shared();
        cache.put(key(9), rows(9)).unwrap();

        let mut overlay = TransactionalCache::new(&cache);
        overlay.put(key(1), rows(1));
        overlay.clear();
        overlay.put(key(2), rows(2));
        overlay.rollback().unwrap();

        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.get(&key(2)).unwrap().is_none());
        assert_eq!(cache.get(&key(9)).unwrap(), Some(rows(9)));
        assert_eq!(overlay.pending_writes(), 0);
        assert!(!overlay.is_clear_on_commit());
    }

    #[test]
    fn test_clear_is_deferred_to_commit() {
        let cache = shared();
        cache.put(key(1), rows(1)).unwrap();

        let mut overlay = TransactionalCache::new(&cache);
        overlay.clear();
        // Hidden from this session, still visible to everybody else.
        assert!(overlay.get(&key(1)).unwrap().is_none());
        assert!(cache.get(&key(1)).unwrap().is_some());

        overlay.put(key(2), rows(2));
        overlay.commit().unwrap();
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert_eq!(cache.get(&key(2)).unwrap(), Some(rows(2)));
    }

    #[test]
    fn test_unresolved_misses_get_placeholders() {
        let cache = shared();
        let mut overlay = TransactionalCache::new(&cache);
        assert!(overlay.get(&key(1)).unwrap().is_none());
        assert!(overlay.get(&key(2)).unwrap().is_none());
        assert_eq!(overlay.missed_keys(), 2);
        overlay.put(key(2), rows(2));
        overlay.commit().unwrap();

        assert_eq!(cache.get(&key(1)).unwrap(), Some(CacheValue::Null));
        assert_eq!(cache.get(&key(2)).unwrap(), Some(rows(2)));
    }

    #[test]
    fn test_placeholder_reads_as_miss() {
        let cache = shared();
        cache.put(key(1), CacheValue::Null).unwrap();
        let mut overlay = TransactionalCache::new(&cache);
        assert!(overlay.get(&key(1)).unwrap().is_none());
        assert_eq!(overlay.missed_keys(), 1);
    }

    #[test]
    fn test_rollback_releases_blocking_lock() {
        let blocking = BlockingCache::new(
            Box::new(SynchronizedCache::new(Box::new(MapCache::new("users")))),
            Some(Duration::from_millis(50)),
        );
        let cache: SharedCache = Arc::new(blocking);

        let mut overlay = TransactionalCache::new(&cache);
        assert!(overlay.get(&key(1)).unwrap().is_none());
        overlay.put(key(1), rows(1));
        overlay.rollback().unwrap();

        let other = cache.clone();
        let seen = thread::spawn(move || other.get(&key(1)).map(|v| v.filter(|v| !v.is_null())))
            .join()
            .unwrap()
            .unwrap();
        assert!(seen.is_none());
    }

    #[test]
    fn test_rollback_keeps_committed_entries_at_capacity() {
        let cache: SharedCache = Arc::new(LruCache::with_capacity(Box::new(MapCache::new("users")), 1));
        cache.put(key(1), rows(1)).unwrap();

        let mut overlay = TransactionalCache::new(&cache);
        assert!(overlay.get(&key(2)).unwrap().is_none());
        overlay.rollback().unwrap();

        assert_eq!(cache.get(&key(1)).unwrap(), Some(rows(1)));
        assert!(cache.get(&key(2)).unwrap().is_none());
        assert_eq!(cache.size(), 1);
    }

    /// Map store whose `clear` and `remove` can be made to fail.
    struct Faulty {
        inner: MapCache,
        fail_clear: bool,
        fail_remove: bool,
    }

    impl Faulty {
        fn new(fail_clear: bool, fail_remove: bool) -> Self {
            Self {
                inner: MapCache::new("users"),
                fail_clear,
                fail_remove,
            }
        }
    }

    impl Cache for Faulty {
        fn id(&self) -> &str {
            self.inner.id()
        }
        fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
            self.inner.put(key, value)
        }
        fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
            self.inner.get(key)
        }
        fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
            if self.fail_remove {
                return Err(CacheError::Execution("remove refused".into()));
            }
            self.inner.remove(key)
        }
        fn clear(&self) -> Result<()> {
            if self.fail_clear {
                return Err(CacheError::Execution("clear refused".into()));
            }
            self.inner.clear()
        }
        fn size(&self) -> usize {
            self.inner.size()
        }
    }

    #[test]
    fn test_rollback_reports_release_failure() {
        let cache: SharedCache = Arc::new(Faulty::new(false, true));
        let mut overlay = TransactionalCache::new(&cache);
        assert!(overlay.get(&key(1)).unwrap().is_none());
        overlay.put(key(1), rows(1));

        let err = overlay.rollback().unwrap_err();
        assert!(matches!(err, CacheError::Execution(msg) if msg == "remove refused"));
        assert_eq!(overlay.missed_keys(), 0);
        assert_eq!(overlay.pending_writes(), 0);
    }

    #[test]
    fn test_failed_clear_still_releases_blocking_locks() {
        let blocking = BlockingCache::new(Box::new(Faulty::new(true, false)), Some(Duration::from_millis(50)));
        let cache: SharedCache = Arc::new(blocking);

        let mut overlay = TransactionalCache::new(&cache);
        assert!(overlay.get(&key(1)).unwrap().is_none());
        overlay.clear();
        overlay.put(key(1), rows(1));

        let err = overlay.commit().unwrap_err();
        assert!(matches!(err, CacheError::Execution(msg) if msg == "clear refused"));
        assert_eq!(cache.size(), 0);

        let other = cache.clone();
        let seen = thread::spawn(move || other.get(&key(1))).join().unwrap();
        assert!(seen.unwrap().is_none());
    }

    #[test]
    fn test_dropped_cache_is_fatal() {
        let cache = shared();
        let mut overlay = TransactionalCache::new(&cache);
        overlay.put(key(1), rows(1));
        drop(cache);

        assert!(matches!(overlay.commit(), Err(CacheError::CacheUnavailable(_))));
        assert_eq!(overlay.pending_writes(), 0);
        assert!(matches!(overlay.rollback(), Err(CacheError::CacheUnavailable(_))));
    }
}
