//! Limited Opener
//!
//! Caches expensive resources (files, connections) by name and caps how many
//! are open at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::{Deleter, Handle, LruCache};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

type OpenFn<T> = dyn Fn(&str) -> anyhow::Result<T> + Send + Sync;
type CloseFn<T> = dyn Fn(&T) -> anyhow::Result<()> + Send + Sync;

// == Limited Opener ==
/// Opens resources on demand, caches them by name, and closes them once they
/// are evicted and every handle has been released.
///
/// A resource holds one permit of the opener's gate from open until close.
/// When all permits are taken, [`LimitedOpener::open`] fails fast with
/// [`CacheError::LimitExceeded`] instead of waiting.
///
/// The cache capacity equals the limit and every resource weighs 1, so
/// opening never evicts: a cached resource keeps its permit after its
/// handles are released. Once `capacity` distinct names are cached, opening
/// a new name fails until one is removed through [`LimitedOpener::cache`]
/// (for example with [`LruCache::erase`] or [`LruCache::remove_back`]).
pub struct LimitedOpener<T> {
    open: Box<OpenFn<T>>,
    close: Arc<CloseFn<T>>,
    cache: LruCache<T>,
    gate: Arc<Semaphore>,
    limit: usize,
}

impl<T> LimitedOpener<T>
where
    T: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an opener keeping at most `capacity` resources open.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new<O, C>(open: O, close: C, capacity: usize) -> Self
    where
        O: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
        C: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        assert!(capacity > 0, "open limit must be positive");
        Self {
            open: Box::new(open),
            close: Arc::new(close),
            cache: LruCache::new(capacity),
            gate: Arc::new(Semaphore::new(capacity)),
            limit: capacity,
        }
    }

    /// Creates an opener limited to [`CacheConfig::open_limit`].
    pub fn from_config<O, C>(open: O, close: C, config: &CacheConfig) -> Self
    where
        O: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
        C: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(open, close, config.open_limit)
    }

    // == Open ==
    /// Returns a handle on the resource called `name`, opening it if it is
    /// not cached.
    ///
    /// # Panics
    /// Panics if `name` is empty.
    pub fn open(&self, name: &str) -> Result<Handle<T>> {
        assert!(!name.is_empty(), "resource name must not be empty");

        if let Some(handle) = self.cache.lookup(name) {
            return Ok(handle);
        }

        let permit = self
            .gate
            .clone()
            .try_acquire_owned()
            .map_err(|_| CacheError::LimitExceeded { limit: self.limit })?;

        // On failure the permit is dropped here, freeing the slot.
        let resource = (self.open)(name).map_err(|source| CacheError::Open {
            name: name.to_string(),
            source,
        })?;
        debug!(name, "opened resource");

        let close = self.close.clone();
        let deleter: Deleter<T> = Box::new(move |name: &str, resource: &T| {
            if let Err(source) = close(resource) {
                let err = CacheError::Close {
                    name: name.to_string(),
                    source,
                };
                warn!(error = %err, cause = %err_cause(&err), "close callback failed");
            } else {
                debug!(name, "closed resource");
            }
            drop(permit);
        });

        Ok(self.cache.insert(name, resource, 1, Some(deleter)))
    }

    // == Introspection ==
    /// Number of resources currently open, cached or not.
    pub fn open_count(&self) -> usize {
        self.limit - self.gate.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The underlying cache of open resources.
    pub fn cache(&self) -> &LruCache<T> {
        &self.cache
    }

    // == Close ==
    /// Closes every cached resource.
    ///
    /// # Panics
    /// Panics if any handle returned by [`LimitedOpener::open`] is still
    /// outstanding.
    pub fn close(&self) -> Result<()> {
        self.cache.close()
    }
}

fn err_cause(err: &CacheError) -> String {
    std::error::Error::source(err)
        .map(|source| source.to_string())
        .unwrap_or_default()
}

impl<T> std::fmt::Debug for LimitedOpener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedOpener")
            .field("limit", &self.limit)
            .field("available", &self.gate.available_permits())
            .finish()
    }
}
