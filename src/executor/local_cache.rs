//! Session-local statement cache
//!
//! Before a statement runs its key is marked [`LocalEntry::InProgress`]. A
//! nested query that reaches the same key sees the marker instead of running
//! again. The marker becomes the result on success and is removed on failure
//! so the statement can be retried.

use crate::cache::CacheKey;
use crate::types::Row;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum LocalEntry {
    InProgress,
    Rows(Vec<Row>),
}

#[derive(Debug, Default)]
pub struct LocalCache {
    entries: HashMap<CacheKey, LocalEntry>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&LocalEntry> {
        self.entries.get(key)
    }

    /// Completed rows for `key`; `None` when absent or in progress.
    pub fn rows(&self, key: &CacheKey) -> Option<&[Row]> {
        match self.entries.get(key) {
            Some(LocalEntry::Rows(rows)) => Some(rows),
            _ => None,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn begin(&mut self, key: CacheKey) {
        self.entries.insert(key, LocalEntry::InProgress);
    }

    pub fn complete(&mut self, key: CacheKey, rows: Vec<Row>) {
        self.entries.insert(key, LocalEntry::Rows(rows));
    }

    pub fn abort(&mut self, key: &CacheKey) {
        if let Some(LocalEntry::InProgress) = self.entries.get(key) {
            self.entries.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
