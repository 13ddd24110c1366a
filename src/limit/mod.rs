//! Limit Module
//!
//! Bounded-concurrency resource opener built on the cache.
//!
//! # Components
//! - LimitedOpener: opens resources by name, caches them, and rejects new
//!   opens once its limit of concurrently open resources is reached

mod opener;

pub use opener::LimitedOpener;
