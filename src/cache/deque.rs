//! Deque Extension Module
//!
//! Queue-style operations on [`LruCache`], for callers that use the recency
//! list as a capacity-bounded work queue rather than a pure cache.

use std::sync::Arc;

use crate::cache::entry::Deleter;
use crate::cache::handle::Handle;
use crate::cache::store::{new_entry, LruCache, Position};

impl<V> LruCache<V> {
    // == Push ==
    /// Inserts at the most recently used end without returning a handle;
    /// the cache holds the only reference.
    ///
    /// # Panics
    /// Panics if `key` is empty or `weight` is zero.
    pub fn push_front(&self, key: impl Into<String>, value: V, weight: usize, deleter: Option<Deleter<V>>) {
        self.push(key.into(), value, weight, deleter, Position::Front);
    }

    /// Inserts at the least recently used end. If the cache is over capacity
    /// afterwards, this entry is the first to go.
    pub fn push_back(&self, key: impl Into<String>, value: V, weight: usize, deleter: Option<Deleter<V>>) {
        self.push(key.into(), value, weight, deleter, Position::Back);
    }

    fn push(&self, key: String, value: V, weight: usize, deleter: Option<Deleter<V>>, position: Position) {
        let entry = Arc::new(new_entry(key, value, weight, deleter, 1));
        self.mutate(|state, dead| state.attach(entry, position, dead));
    }

    // == Peek ==
    /// Returns a handle on the most recently used entry without changing
    /// the order.
    pub fn front(&self) -> Option<Handle<V>> {
        let state = self.lock();
        let entry = state.list.front()?.clone();
        entry.retain();
        Some(Handle::new(entry))
    }

    /// Returns a handle on the least recently used entry without changing
    /// the order.
    pub fn back(&self) -> Option<Handle<V>> {
        let state = self.lock();
        let entry = state.list.back()?.clone();
        entry.retain();
        Some(Handle::new(entry))
    }

    pub fn front_key(&self) -> Option<String> {
        self.front().map(|handle| handle.key().to_string())
    }

    pub fn back_key(&self) -> Option<String> {
        self.back().map(|handle| handle.key().to_string())
    }

    /// Clone of the most recently used value, without changing the order.
    pub fn front_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.front().map(|handle| handle.value().clone())
    }

    /// Clone of the least recently used value, without changing the order.
    pub fn back_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.back().map(|handle| handle.value().clone())
    }

    // == Pop ==
    /// Unindexes the most recently used entry, handing the cache's
    /// reference to the returned handle.
    pub fn pop_front(&self) -> Option<Handle<V>> {
        let entry = self.lock().detach_front()?;
        Some(Handle::new(entry))
    }

    /// Unindexes the least recently used entry, handing the cache's
    /// reference to the returned handle.
    pub fn pop_back(&self) -> Option<Handle<V>> {
        let entry = self.lock().detach_back()?;
        Some(Handle::new(entry))
    }

    pub fn remove_front(&self) {
        drop(self.pop_front());
    }

    pub fn remove_back(&self) {
        drop(self.pop_back());
    }

    // == Move ==
    /// Promotes `key` to most recently used and refreshes its access time.
    /// Returns `false` if the key is absent.
    pub fn move_to_front(&self, key: &str) -> bool {
        let mut state = self.lock();
        let Some(&id) = state.index.get(key) else {
            return false;
        };
        state.list.move_to_front(id);
        if let Some(entry) = state.list.get(id) {
            entry.touch();
        }
        true
    }

    /// Demotes `key` to least recently used. The access time is left alone,
    /// so a demoted entry keeps aging. Returns `false` if the key is absent.
    pub fn move_to_back(&self, key: &str) -> bool {
        let mut state = self.lock();
        let Some(&id) = state.index.get(key) else {
            return false;
        };
        state.list.move_to_back(id)
    }

    /// Reports whether `key` is indexed, without touching the order.
    pub fn has_key(&self, key: &str) -> bool {
        self.lock().index.contains_key(key)
    }
}
