//! Interval-based full clear

use super::parse_millis;
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::Result;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Clears the inner cache before any operation once the interval has elapsed
/// since the last clear.
pub struct ScheduledCache {
    inner: Box<dyn Cache>,
    clear_interval: Duration,
    last_clear: Mutex<Instant>,
}

impl ScheduledCache {
    pub fn new(inner: Box<dyn Cache>, clear_interval: Duration) -> Self {
        Self {
            inner,
            clear_interval,
            last_clear: Mutex::new(Instant::now()),
        }
    }

    pub fn clear_interval(&self) -> Duration {
        self.clear_interval
    }

    fn clear_when_stale(&self) -> Result<bool> {
        let mut last_clear = self.last_clear.lock();
        if last_clear.elapsed() < self.clear_interval {
            return Ok(false);
        }
        self.inner.clear()?;
        *last_clear = Instant::now();
        debug!(
            cache = self.inner.id(),
            interval_ms = self.clear_interval.as_millis() as u64,
            "scheduled clear"
        );
        Ok(true)
    }
}

impl Cache for ScheduledCache {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn put(&self, key: CacheKey, value: CacheValue) -> Result<()> {
        self.clear_when_stale()?;
        self.inner.put(key, value)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        if self.clear_when_stale()? {
            return Ok(None);
        }
        self.inner.get(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheValue>> {
        self.clear_when_stale()?;
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        let mut last_clear = self.last_clear.lock();
        self.inner.clear()?;
        *last_clear = Instant::now();
        Ok(())
    }

    fn size(&self) -> usize {
        if let Err(err) = self.clear_when_stale() {
            warn!(cache = self.inner.id(), error = %err, "scheduled clear failed");
        }
        self.inner.size()
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<bool> {
        match name {
            "clearInterval" => {
                self.clear_interval = parse_millis(name, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
