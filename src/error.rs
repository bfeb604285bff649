//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// Every fallible operation fails before touching any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Invalid construction-time configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument passed to an operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Cache is full and eviction failed
    #[error("Cache full: {0}")]
    CacheFull(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::InvalidArgument(format!("malformed snapshot: {}", err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
