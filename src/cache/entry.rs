//! Cache Entry Module
//!
//! Defines the unit of storage: a keyed value with its weight, deleter,
//! timestamps and live reference count.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

// == Deleter ==
/// Callback invoked exactly once with the key and value of an entry when its
/// last reference is dropped.
pub type Deleter<V> = Box<dyn FnOnce(&str, &V) + Send>;

// == Entry ==
/// A single cached value plus the bookkeeping that governs its lifetime.
///
/// `refs` counts the engine's own reference (while indexed) and one per
/// outstanding handle. The deleter runs when it drops from 1 to 0.
pub(crate) struct Entry<V> {
    key: String,
    value: V,
    weight: usize,
    deleter: Mutex<Option<Deleter<V>>>,
    created_at: DateTime<Utc>,
    /// Unix timestamp in microseconds
    accessed_at: AtomicI64,
    refs: AtomicUsize,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an entry holding `refs` references.
    pub(crate) fn new(
        key: String,
        value: V,
        weight: usize,
        deleter: Option<Deleter<V>>,
        refs: usize,
    ) -> Self {
        // Both timestamps carry microsecond precision.
        let now = Utc::now();
        let micros = now.timestamp_micros();
        Self {
            key,
            value,
            weight,
            deleter: Mutex::new(deleter),
            created_at: DateTime::from_timestamp_micros(micros).unwrap_or(now),
            accessed_at: AtomicI64::new(micros),
            refs: AtomicUsize::new(refs),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    pub(crate) fn weight(&self) -> usize {
        self.weight
    }

    pub(crate) fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn accessed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.accessed_at.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    // == Touch ==
    /// Marks the entry as accessed now.
    pub(crate) fn touch(&self) {
        self.accessed_at
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    // == Retain ==
    /// Adds a reference. The caller must already hold one.
    pub(crate) fn retain(&self) {
        let prev = self.refs.fetch_add(1, Ordering::Relaxed);
        assert!(prev > 0, "retain on destroyed entry {:?}", self.key);
    }

    // == Release ==
    /// Drops a reference.
    ///
    /// Returns `true` if this was the last one, in which case the caller is
    /// responsible for calling [`Entry::destroy`].
    pub(crate) fn release(&self) -> bool {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "entry {:?} released more often than retained", self.key);
        prev == 1
    }

    // == Destroy ==
    /// Runs the deleter, if any. Only the first call has an effect.
    pub(crate) fn destroy(&self) {
        let deleter = self.deleter.lock().take();
        if let Some(deleter) = deleter {
            deleter(&self.key, &self.value);
        }
    }
}

impl<V> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("weight", &self.weight)
            .field("refs", &self.refs())
            .finish()
    }
}
