//! Cache Module
//!
//! Weight-bounded LRU cache whose entries are pinned by reference-counted
//! handles.

mod deque;
mod entry;
mod handle;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::Deleter;
pub use handle::Handle;
pub use stats::CacheStats;
pub use store::LruCache;
