//! Cache decorators
//!
//! Each decorator wraps one inner cache and adds a single concern:
//! - eviction: [`LruCache`], [`FifoCache`], [`TieredCache`]
//! - maintenance: [`ScheduledCache`]
//! - transport: [`SerializedCache`]
//! - statistics: [`StatsCache`]
//! - concurrency: [`SynchronizedCache`], [`BlockingCache`]

pub mod blocking;
pub mod fifo;
pub mod lru;
pub mod scheduled;
pub mod serialized;
pub mod stats;
pub mod synchronized;
pub mod tiered;

pub use self::blocking::BlockingCache;
pub use self::fifo::FifoCache;
pub use self::lru::LruCache;
pub use self::scheduled::ScheduledCache;
pub use self::serialized::SerializedCache;
pub use self::stats::StatsCache;
pub use self::synchronized::SynchronizedCache;
pub use self::tiered::TieredCache;

use crate::{CacheError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Default capacity of the LRU and FIFO decorators
pub const DEFAULT_CAPACITY: usize = 1024;

pub(crate) fn parse_setting<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        CacheError::Config(format!("invalid value '{}' for cache property '{}'", value, name))
    })
}

pub(crate) fn parse_capacity(name: &str, value: &str) -> Result<usize> {
    let capacity: usize = parse_setting(name, value)?;
    if capacity == 0 {
        return Err(CacheError::Config(format!("cache property '{}' must be at least 1", name)));
    }
    Ok(capacity)
}

pub(crate) fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    parse_setting::<u64>(name, value).map(Duration::from_millis)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        assert_eq!(parse_capacity("size", " 16 ").unwrap(), 16);
        assert!(parse_capacity("size", "0").is_err());
        assert!(matches!(parse_capacity("size", "many"), Err(CacheError::Config(_))));
        assert_eq!(parse_millis("clearInterval", "250").unwrap(), Duration::from_millis(250));
    }
}
