//! Cache Handle Module
//!
//! The capability returned to callers for a live entry.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::entry::Entry;

// == Handle ==
/// A counted reference to a cache entry.
///
/// The entry's value stays readable through the handle until it is released,
/// even if the key is erased, evicted or overwritten in the meantime. The
/// entry's deleter runs once the cache and every handle have let go of it.
///
/// A handle is released either explicitly with [`Handle::release`] or when
/// it is dropped. Releasing twice or reading a released handle panics.
#[must_use = "dropping a handle releases it immediately"]
pub struct Handle<V> {
    entry: Arc<Entry<V>>,
    released: bool,
}

impl<V> Handle<V> {
    /// Wraps a reference the caller has already counted on `entry`.
    pub(crate) fn new(entry: Arc<Entry<V>>) -> Self {
        Self {
            entry,
            released: false,
        }
    }

    // == Accessors ==
    /// Returns the stored value.
    ///
    /// # Panics
    /// Panics if the handle has been released.
    pub fn value(&self) -> &V {
        self.assert_live();
        self.entry.value()
    }

    pub fn key(&self) -> &str {
        self.entry.key()
    }

    /// Weight the entry was inserted with.
    pub fn size(&self) -> usize {
        self.entry.weight()
    }

    pub fn time_created(&self) -> DateTime<Utc> {
        self.entry.created_at()
    }

    /// Time of the last lookup or promotion of the entry.
    pub fn time_accessed(&self) -> DateTime<Utc> {
        self.entry.accessed_at()
    }

    /// Number of live references on the entry, the cache's own included.
    pub fn ref_count(&self) -> usize {
        self.entry.refs()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    // == Retain ==
    /// Returns another handle on the same entry.
    ///
    /// # Panics
    /// Panics if the handle has been released.
    pub fn retain(&self) -> Handle<V> {
        self.assert_live();
        self.entry.retain();
        Handle::new(self.entry.clone())
    }

    // == Release ==
    /// Gives up this handle's reference. If it was the last one, the entry's
    /// deleter runs before this call returns.
    ///
    /// # Panics
    /// Panics if the handle has already been released.
    pub fn release(&mut self) {
        assert!(
            !self.released,
            "handle for key {:?} released twice",
            self.entry.key()
        );
        self.released = true;
        if self.entry.release() {
            self.entry.destroy();
        }
    }

    fn assert_live(&self) {
        assert!(
            !self.released,
            "handle for key {:?} used after release",
            self.entry.key()
        );
    }
}

impl<V> Drop for Handle<V> {
    fn drop(&mut self) {
        if !self.released {
            self.release();
        }
    }
}

impl<V> fmt::Debug for Handle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.entry.key())
            .field("size", &self.entry.weight())
            .field("released", &self.released)
            .finish()
    }
}
