//! Cache Store Module
//!
//! Main cache engine combining the key index with the recency list under a
//! single lock, weighted capacity enforcement and handle reference counting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::cache::entry::{Deleter, Entry};
use crate::cache::handle::Handle;
use crate::cache::lru::{RecencyList, SlotId};
use crate::cache::stats::{CacheStats, Counters};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Entries whose last reference was dropped under the lock. Their deleters
/// run once the lock is released.
pub(super) type Dead<V> = Vec<Arc<Entry<V>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Position {
    Front,
    Back,
}

// == Cache State ==
/// Everything guarded by the engine lock.
#[derive(Debug)]
pub(super) struct CacheState<V> {
    pub(super) index: HashMap<String, SlotId>,
    pub(super) list: RecencyList<V>,
    /// Sum of the weights of indexed entries
    pub(super) size: usize,
    pub(super) capacity: usize,
    pub(super) counters: Counters,
    last_id: u64,
    closed: bool,
}

impl<V> CacheState<V> {
    fn new(capacity: usize) -> Self {
        Self {
            index: HashMap::new(),
            list: RecencyList::new(),
            size: 0,
            capacity,
            counters: Counters::default(),
            last_id: 0,
            closed: false,
        }
    }

    pub(super) fn entry(&self, id: SlotId) -> Option<Arc<Entry<V>>> {
        self.list.get(id).cloned()
    }

    // == Attach ==
    /// Indexes `entry`, replacing any entry with the same key, then enforces
    /// capacity.
    pub(super) fn attach(&mut self, entry: Arc<Entry<V>>, position: Position, dead: &mut Dead<V>) {
        let key = entry.key().to_string();
        if let Some(old) = self.detach(&key) {
            debug!(key = %key, "replacing cached entry");
            drop_ref(old, dead);
        }

        self.size += entry.weight();
        let id = match position {
            Position::Front => self.list.push_front(entry),
            Position::Back => self.list.push_back(entry),
        };
        self.index.insert(key, id);
        self.check_capacity(dead);
    }

    // == Detach ==
    /// Unindexes the entry for `key`. The engine's reference is handed to
    /// the caller.
    pub(super) fn detach(&mut self, key: &str) -> Option<Arc<Entry<V>>> {
        let id = self.index.remove(key)?;
        let entry = match self.list.remove(id) {
            Some(entry) => entry,
            None => unreachable!("index and recency list disagree on key {key:?}"),
        };
        self.size -= entry.weight();
        Some(entry)
    }

    pub(super) fn detach_front(&mut self) -> Option<Arc<Entry<V>>> {
        let entry = self.list.pop_front()?;
        self.unindex(&entry);
        Some(entry)
    }

    pub(super) fn detach_back(&mut self) -> Option<Arc<Entry<V>>> {
        let entry = self.list.pop_back()?;
        self.unindex(&entry);
        Some(entry)
    }

    fn unindex(&mut self, entry: &Entry<V>) {
        self.index.remove(entry.key());
        self.size -= entry.weight();
    }

    // == Check Capacity ==
    /// Evicts from the back until the cache fits, always keeping the most
    /// recent entry resident.
    pub(super) fn check_capacity(&mut self, dead: &mut Dead<V>) {
        while self.size > self.capacity && self.index.len() > 1 {
            let Some(entry) = self.detach_back() else {
                break;
            };
            self.counters.record_eviction();
            debug!(
                key = entry.key(),
                weight = entry.weight(),
                size = self.size,
                capacity = self.capacity,
                "evicted entry"
            );
            drop_ref(entry, dead);
        }
    }

    /// Unindexes every entry, front to back.
    fn drain(&mut self) -> Vec<Arc<Entry<V>>> {
        self.index.clear();
        self.size = 0;
        self.list.drain()
    }
}

/// Drops the engine's reference on a detached entry.
pub(super) fn drop_ref<V>(entry: Arc<Entry<V>>, dead: &mut Dead<V>) {
    if entry.release() {
        dead.push(entry);
    }
}

// == LRU Cache ==
/// A thread-safe, weight-bounded LRU cache handing out reference-counted
/// [`Handle`]s.
///
/// Entries evicted or erased while a handle is outstanding stay alive until
/// that handle is released; their deleter runs exactly once, after the last
/// reference is gone and never while the cache lock is held.
pub struct LruCache<V> {
    state: Mutex<CacheState<V>>,
}

impl<V> LruCache<V> {
    // == Constructor ==
    /// Creates an empty cache holding up to `capacity` total weight.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            state: Mutex::new(CacheState::new(capacity)),
        }
    }

    /// Creates a cache sized by [`CacheConfig::capacity`].
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    // == Locking ==
    pub(super) fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        let state = self.state.lock();
        assert!(!state.closed, "cache used after close");
        state
    }

    /// Runs `f` under the lock, then runs the deleters of every entry whose
    /// last reference `f` dropped.
    pub(super) fn mutate<R>(&self, f: impl FnOnce(&mut CacheState<V>, &mut Dead<V>) -> R) -> R {
        let mut dead = Vec::new();
        let result = {
            let mut state = self.lock();
            f(&mut state, &mut dead)
        };
        for entry in dead {
            entry.destroy();
        }
        result
    }

    // == New Id ==
    /// Returns a fresh numeric id, for clients that share a cache and want
    /// to partition the key space by prefixing their keys.
    pub fn new_id(&self) -> u64 {
        let mut state = self.lock();
        state.last_id = state.last_id.wrapping_add(1);
        state.last_id
    }

    // == Insert ==
    /// Inserts `value` under `key` at the most recently used position and
    /// charges `weight` against the capacity.
    ///
    /// An existing entry for `key` is unindexed first. When the new entry's
    /// last reference is dropped, `deleter` is called with its key and value.
    /// The returned handle must be released (or dropped) by the caller.
    ///
    /// # Panics
    /// Panics if `key` is empty or `weight` is zero.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: V,
        weight: usize,
        deleter: Option<Deleter<V>>,
    ) -> Handle<V> {
        let entry = Arc::new(new_entry(key.into(), value, weight, deleter, 2));
        trace!(key = entry.key(), weight, "insert");
        self.mutate(|state, dead| state.attach(entry.clone(), Position::Front, dead));
        Handle::new(entry)
    }

    // == Lookup ==
    /// Returns a handle on the entry for `key`, promoting it to most
    /// recently used.
    pub fn lookup(&self, key: &str) -> Option<Handle<V>> {
        let mut state = self.lock();
        let Some(&id) = state.index.get(key) else {
            state.counters.record_miss();
            return None;
        };

        state.list.move_to_front(id);
        let entry = state.entry(id)?;
        entry.touch();
        entry.retain();
        state.counters.record_hit();
        trace!(key, "lookup hit");
        Some(Handle::new(entry))
    }

    // == Take ==
    /// Unindexes the entry for `key` and hands the cache's own reference to
    /// the returned handle.
    pub fn take(&self, key: &str) -> Option<Handle<V>> {
        let entry = self.lock().detach(key)?;
        Some(Handle::new(entry))
    }

    // == Erase ==
    /// Unindexes the entry for `key`, if any. Outstanding handles keep the
    /// entry alive until they are released.
    pub fn erase(&self, key: &str) {
        self.mutate(|state, dead| {
            if let Some(entry) = state.detach(key) {
                drop_ref(entry, dead);
            }
        });
    }

    // == Set Capacity ==
    /// Changes the capacity, evicting immediately if the cache no longer
    /// fits.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn set_capacity(&self, capacity: usize) {
        assert!(capacity > 0, "cache capacity must be positive");
        self.mutate(|state, dead| {
            state.capacity = capacity;
            state.check_capacity(dead);
        });
    }

    // == Clear ==
    /// Drops the cache's reference on every entry. Handles need not have
    /// been released.
    pub fn clear(&self) {
        self.mutate(|state, dead| {
            let entries = state.drain();
            debug!(entries = entries.len(), "clearing cache");
            for entry in entries {
                drop_ref(entry, dead);
            }
        });
    }

    // == Close ==
    /// Destroys every entry and makes the cache unusable.
    ///
    /// Returns [`CacheError::Closed`] if the cache was already closed.
    ///
    /// # Panics
    /// Panics if any entry still has an outstanding handle.
    pub fn close(&self) -> Result<()> {
        let mut dead = Vec::new();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(CacheError::Closed);
            }
            for entry in state.list.iter() {
                assert!(
                    entry.refs() == 1,
                    "cache closed while key {:?} has {} outstanding handle(s)",
                    entry.key(),
                    entry.refs() - 1
                );
            }

            let entries = state.drain();
            debug!(entries = entries.len(), "closing cache");
            for entry in entries {
                drop_ref(entry, &mut dead);
            }
            state.closed = true;
        }
        for entry in dead {
            entry.destroy();
        }
        Ok(())
    }

    // == Introspection ==
    /// Returns a snapshot of occupancy and access counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            length: state.index.len(),
            size: state.size,
            capacity: state.capacity,
            oldest_access: state.list.back().map(|entry| entry.accessed_at()),
            hits: state.counters.hits,
            misses: state.counters.misses,
            evictions: state.counters.evictions,
        }
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().list.is_empty()
    }

    /// Sum of the weights of indexed entries.
    pub fn size(&self) -> usize {
        self.lock().size
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .list
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    /// Access time of the most recently used entry.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.lock().list.front().map(|entry| entry.accessed_at())
    }

    /// Access time of the least recently used entry.
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.lock().list.back().map(|entry| entry.accessed_at())
    }

    // == Convenience ==
    /// Inserts and immediately releases the returned handle.
    pub fn set(&self, key: impl Into<String>, value: V, weight: usize) {
        drop(self.insert(key, value, weight, None));
    }

    /// Returns a clone of the value for `key`, promoting it like
    /// [`LruCache::lookup`].
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let handle = self.lookup(key)?;
        Some(handle.value().clone())
    }

    pub fn value_or(&self, key: &str, default: V) -> V
    where
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Asserts that the index, recency list and size agree.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let state = self.lock();
        assert_eq!(state.index.len(), state.list.len(), "index/list length mismatch");

        let mut total = 0;
        for entry in state.list.iter() {
            let id = state.index[entry.key()];
            let indexed = state.list.get(id).expect("indexed slot is vacant");
            assert!(Arc::ptr_eq(indexed, entry), "index points at wrong entry");
            assert!(entry.refs() >= 1, "indexed entry without engine reference");
            total += entry.weight();
        }
        assert_eq!(total, state.size, "size does not match indexed weights");
    }
}

pub(super) fn new_entry<V>(
    key: String,
    value: V,
    weight: usize,
    deleter: Option<Deleter<V>>,
    refs: usize,
) -> Entry<V> {
    assert!(!key.is_empty(), "cache key must not be empty");
    assert!(weight > 0, "entry weight must be positive (key {key:?})");
    Entry::new(key, value, weight, deleter, refs)
}

impl<V> Drop for LruCache<V> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.closed {
            return;
        }
        for entry in state.drain() {
            if entry.release() {
                entry.destroy();
            }
        }
    }
}

impl<V> std::fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LruCache")
            .field("length", &state.index.len())
            .field("size", &state.size)
            .field("capacity", &state.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}
