//! Mapper Cache
//!
//! Two-tier statement caching for a SQL-mapping query layer.
//!
//! ## Tiers
//! - Session-local statement cache: memoizes results within one unit of
//!   work and detects recursive queries through in-progress markers
//! - Shared caches: application-scoped decorator chains (eviction, scheduled
//!   clear, copy-on-read, statistics, locking) reached through a per-session
//!   transactional overlay, so writes and clears publish only on commit
//!
//! ## Layout
//! - `cache`: cache contract, base store, decorators, assembler, cache key,
//!   overlay and overlay manager
//! - `executor`: database primitive, local-cache executor, caching coordinator
//! - `catalog`: settings, factories and the cache/statement registry
//! - `session`: unit-of-work façade

pub mod cache;
pub mod catalog;
pub mod config;
pub mod executor;
pub mod session;
pub mod statement;
pub mod types;

mod error;

pub use cache::{Cache, CacheBuilder, CacheFactoryRegistry, CacheKey, CacheStats, CacheValue, SharedCache};
pub use catalog::{CacheRegistry, Catalog};
pub use config::{CacheConfig, LocalCacheScope, Settings};
pub use error::{CacheError, Result};
pub use executor::{Database, Executor};
pub use session::Session;
pub use statement::{MappedStatement, StatementKind};
pub use types::{Row, RowBounds, Value};
