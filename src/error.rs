//! Error types for the cache and its collaborators
//!
//! Provides unified error handling using thiserror. Only expected negative
//! outcomes are errors; broken preconditions panic.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the crate.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The opener already holds its maximum number of open resources
    #[error("open limit of {limit} resources reached")]
    LimitExceeded { limit: usize },

    /// The open callback failed
    #[error("failed to open {name:?}")]
    Open {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The close callback failed
    #[error("failed to close {name:?}")]
    Close {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The cache has already been closed
    #[error("cache already closed")]
    Closed,
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
