//! Error types for the statement cache

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Timed out after {timeout_ms}ms waiting for lock on key {key} in cache {cache}")]
    LockTimeout {
        cache: String,
        key: String,
        timeout_ms: u64,
    },

    #[error("Value is not serializable: {0}")]
    NotSerializable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache configuration error: {0}")]
    Config(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Query already in progress for key: {0}")]
    QueryInProgress(String),

    #[error("Caching not supported: {0}")]
    UnsupportedCaching(String),

    #[error("Mapped statement not found: {0}")]
    StatementNotFound(String),

    #[error("Expected one row from {statement}, found {found}")]
    TooManyResults { statement: String, found: usize },

    #[error("Executor was closed")]
    ExecutorClosed,

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether the error was raised by the cache layer rather than by
    /// the underlying statement execution.
    pub fn is_cache_error(&self) -> bool {
        !matches!(self, CacheError::Execution(_))
    }

    /// Blocking-wait failures leave the cache consistent; the statement
    /// may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::LockTimeout { .. })
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = CacheError::LockTimeout {
            cache: "users".to_string(),
            key: "1:1:k".to_string(),
            timeout_ms: 50,
        };
        assert!(timeout.is_cache_error());
        assert!(timeout.is_retryable());

        let exec = CacheError::Execution("connection reset".to_string());
        assert!(!exec.is_cache_error());
        assert!(!exec.is_retryable());
        assert_eq!(exec.to_string(), "Execution error: connection reset");
    }
}
