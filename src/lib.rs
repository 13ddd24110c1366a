//! refcache - An in-memory LRU cache with reference-counted handles
//!
//! Keeps hot entries resident within a weighted capacity and evicts the
//! least recently used ones, but never destroys an entry while a caller
//! still holds a [`Handle`] to it.

pub mod cache;
pub mod config;
pub mod error;
pub mod limit;
pub mod tasks;

pub use cache::{CacheStats, Deleter, Handle, LruCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use limit::LimitedOpener;
pub use tasks::{Task, TaskWorker};
