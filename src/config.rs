//! Catalog settings and per-cache declarative configuration
//!
//! Both are plain serde types so they can be loaded from JSON alongside the
//! rest of an application's configuration.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifetime of the session-local statement cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalCacheScope {
    /// Entries live until the session commits, rolls back, writes or closes
    #[default]
    Session,

    /// Entries are dropped after every top-level query; only recursion
    /// detection and deferred loads use the cache
    Statement,
}

/// Catalog-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Install the shared-cache coordinator on new executors
    pub cache_enabled: bool,

    /// Scope of the session-local statement cache
    pub local_cache_scope: LocalCacheScope,

    /// Database environment id; contributes to every cache key when set
    pub environment_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            environment_id: None,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Shared cache disabled; only the session-local cache is used
    pub fn local_only() -> Self {
        Self {
            cache_enabled: false,
            ..Default::default()
        }
    }

    /// Local cache reduced to statement scope
    pub fn for_statement_scope() -> Self {
        Self {
            local_cache_scope: LocalCacheScope::Statement,
            ..Default::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            environment_id: Some("test".to_string()),
            ..Default::default()
        }
    }
}

fn default_eviction() -> Vec<String> {
    vec!["LRU".to_string()]
}

/// Declarative configuration of one shared cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache identity, normally the statement namespace
    pub id: String,

    /// Registered store name; `None` selects the built-in map store
    #[serde(default)]
    pub implementation: Option<String>,

    /// Registered eviction decorators, applied in order
    #[serde(default = "default_eviction")]
    pub eviction: Vec<String>,

    /// Bound passed to the eviction decorator's `size` setting
    #[serde(default)]
    pub size: Option<usize>,

    /// Scheduled full clear, in milliseconds
    #[serde(default)]
    pub flush_interval: Option<u64>,

    /// Install the copy-on-read layer: every read decodes a fresh copy
    #[serde(default)]
    pub read_only: bool,

    /// Block concurrent misses on the same key
    #[serde(default)]
    pub blocking: bool,

    /// Wait limit for blocked readers, in milliseconds; `None` waits forever
    #[serde(default)]
    pub blocking_timeout: Option<u64>,

    /// Free-form settings forwarded to any layer that exposes them
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CacheConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: None,
            eviction: default_eviction(),
            size: None,
            flush_interval: None,
            read_only: false,
            blocking: false,
            blocking_timeout: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn eviction(mut self, name: impl Into<String>) -> Self {
        self.eviction = vec![name.into()];
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn flush_interval(mut self, millis: u64) -> Self {
        self.flush_interval = Some(millis);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn blocking(mut self, timeout_ms: Option<u64>) -> Self {
        self.blocking = true;
        self.blocking_timeout = timeout_ms;
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}
