//! Recency List Module
//!
//! Doubly linked recency ordering of cache entries, stored in a slot arena.
//!
//! Links are slot indices rather than pointers. Every slot carries a
//! generation that is bumped when the slot is freed, so a stale [`SlotId`]
//! never resolves to the entry that later reuses the slot.

use std::sync::Arc;

use crate::cache::entry::Entry;

// == Slot Id ==
/// Stable position of an entry in the [`RecencyList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node<V> {
    entry: Arc<Entry<V>>,
    /// Towards the front (more recently used)
    prev: Option<usize>,
    /// Towards the back (less recently used)
    next: Option<usize>,
}

#[derive(Debug)]
struct Slot<V> {
    generation: u64,
    node: Option<Node<V>>,
}

// == Recency List ==
/// Recency ordering of entries.
///
/// - Front = most recently used or inserted
/// - Back = least recently used, first to be evicted
#[derive(Debug)]
pub(crate) struct RecencyList<V> {
    slots: Vec<Slot<V>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<V> Default for RecencyList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RecencyList<V> {
    // == Constructor ==
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    // == Get ==
    /// Resolves a slot id to its entry, or `None` if the id is stale.
    pub(crate) fn get(&self, id: SlotId) -> Option<&Arc<Entry<V>>> {
        self.node(id).map(|node| &node.entry)
    }

    pub(crate) fn front(&self) -> Option<&Arc<Entry<V>>> {
        self.head.map(|index| &self.node_at(index).entry)
    }

    pub(crate) fn back(&self) -> Option<&Arc<Entry<V>>> {
        self.tail.map(|index| &self.node_at(index).entry)
    }

    // == Push ==
    /// Inserts an entry at the front.
    pub(crate) fn push_front(&mut self, entry: Arc<Entry<V>>) -> SlotId {
        let id = self.alloc(entry);
        self.link_front(id.index);
        id
    }

    /// Inserts an entry at the back.
    pub(crate) fn push_back(&mut self, entry: Arc<Entry<V>>) -> SlotId {
        let id = self.alloc(entry);
        self.link_back(id.index);
        id
    }

    // == Pop ==
    pub(crate) fn pop_front(&mut self) -> Option<Arc<Entry<V>>> {
        let index = self.head?;
        Some(self.free_slot(index))
    }

    pub(crate) fn pop_back(&mut self) -> Option<Arc<Entry<V>>> {
        let index = self.tail?;
        Some(self.free_slot(index))
    }

    // == Remove ==
    /// Unlinks the entry at `id` and frees its slot.
    pub(crate) fn remove(&mut self, id: SlotId) -> Option<Arc<Entry<V>>> {
        self.node(id)?;
        Some(self.free_slot(id.index))
    }

    // == Move ==
    /// Moves the entry at `id` to the front. Returns `false` for a stale id.
    pub(crate) fn move_to_front(&mut self, id: SlotId) -> bool {
        if self.node(id).is_none() {
            return false;
        }
        if self.head != Some(id.index) {
            self.unlink(id.index);
            self.link_front(id.index);
        }
        true
    }

    /// Moves the entry at `id` to the back. Returns `false` for a stale id.
    pub(crate) fn move_to_back(&mut self, id: SlotId) -> bool {
        if self.node(id).is_none() {
            return false;
        }
        if self.tail != Some(id.index) {
            self.unlink(id.index);
            self.link_back(id.index);
        }
        true
    }

    // == Iter ==
    /// Iterates entries from front (most recent) to back.
    pub(crate) fn iter(&self) -> Iter<'_, V> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    // == Drain ==
    /// Removes every entry, returning them front to back. Slot storage is
    /// released as well.
    pub(crate) fn drain(&mut self) -> Vec<Arc<Entry<V>>> {
        let mut entries = Vec::with_capacity(self.len);
        while let Some(entry) = self.pop_front() {
            entries.push(entry);
        }
        self.slots.clear();
        self.free.clear();
        entries
    }

    // == Internal: Slot Management ==

    fn node(&self, id: SlotId) -> Option<&Node<V>> {
        let slot = self.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_at(&self, index: usize) -> &Node<V> {
        match self.slots[index].node.as_ref() {
            Some(node) => node,
            None => unreachable!("linked slot {index} is vacant"),
        }
    }

    fn node_at_mut(&mut self, index: usize) -> &mut Node<V> {
        match self.slots[index].node.as_mut() {
            Some(node) => node,
            None => unreachable!("linked slot {index} is vacant"),
        }
    }

    fn alloc(&mut self, entry: Arc<Entry<V>>) -> SlotId {
        let node = Node {
            entry,
            prev: None,
            next: None,
        };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            SlotId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            SlotId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    fn free_slot(&mut self, index: usize) -> Arc<Entry<V>> {
        self.unlink(index);
        let slot = &mut self.slots[index];
        let node = match slot.node.take() {
            Some(node) => node,
            None => unreachable!("freeing vacant slot {index}"),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        node.entry
    }

    // == Internal: Linked List Operations ==

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = self.node_at_mut(index);
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.node_at_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_at_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    fn link_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let node = self.node_at_mut(index);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => self.node_at_mut(head).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn link_back(&mut self, index: usize) {
        let old_tail = self.tail;
        {
            let node = self.node_at_mut(index);
            node.next = None;
            node.prev = old_tail;
        }
        match old_tail {
            Some(tail) => self.node_at_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }
}

// == Iterator ==
pub(crate) struct Iter<'a, V> {
    list: &'a RecencyList<V>,
    cursor: Option<usize>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a Arc<Entry<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = self.list.node_at(index);
        self.cursor = node.next;
        Some(&node.entry)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str) -> Arc<Entry<()>> {
        Arc::new(Entry::new(key.to_string(), (), 1, None, 1))
    }

    fn keys(list: &RecencyList<()>) -> Vec<String> {
        list.iter().map(|e| e.key().to_string()).collect()
    }

    #[test]
    fn test_list_new() {
        let list: RecencyList<()> = RecencyList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.front().is_none());
        assert!(list.back().is_none());
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut list = RecencyList::new();
        list.push_front(entry("a"));
        list.push_front(entry("b"));
        list.push_front(entry("c"));

        assert_eq!(keys(&list), ["c", "b", "a"]);
        assert_eq!(list.back().map(|e| e.key()), Some("a"));
    }

    #[test]
    fn test_push_back_appends() {
        let mut list = RecencyList::new();
        list.push_back(entry("a"));
        list.push_back(entry("b"));
        list.push_front(entry("z"));

        assert_eq!(keys(&list), ["z", "a", "b"]);
    }

    #[test]
    fn test_pop_from_both_ends() {
        let mut list = RecencyList::new();
        for key in ["a", "b", "c"] {
            list.push_front(entry(key));
        }

        assert_eq!(list.pop_back().map(|e| e.key().to_string()), Some("a".into()));
        assert_eq!(list.pop_front().map(|e| e.key().to_string()), Some("c".into()));
        assert_eq!(keys(&list), ["b"]);
        assert_eq!(list.pop_back().map(|e| e.key().to_string()), Some("b".into()));
        assert!(list.pop_back().is_none());
        assert!(list.pop_front().is_none());
    }

    #[test]
    fn test_move_to_front_and_back() {
        let mut list = RecencyList::new();
        let a = list.push_front(entry("a"));
        list.push_front(entry("b"));
        let c = list.push_front(entry("c"));

        assert!(list.move_to_front(a));
        assert_eq!(keys(&list), ["a", "c", "b"]);

        assert!(list.move_to_back(c));
        assert_eq!(keys(&list), ["a", "b", "c"]);

        // Already in place
        assert!(list.move_to_back(c));
        assert!(list.move_to_front(a));
        assert_eq!(keys(&list), ["a", "b", "c"]);
    }

    #[test]
    fn test_remove_middle() {
        let mut list = RecencyList::new();
        list.push_front(entry("a"));
        let b = list.push_front(entry("b"));
        list.push_front(entry("c"));

        let removed = list.remove(b).unwrap();
        assert_eq!(removed.key(), "b");
        assert_eq!(keys(&list), ["c", "a"]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_stale_id_after_slot_reuse() {
        let mut list = RecencyList::new();
        let a = list.push_front(entry("a"));
        list.remove(a).unwrap();

        // Reuses the freed slot with a new generation
        let b = list.push_front(entry("b"));
        assert_ne!(a, b);

        assert!(list.get(a).is_none());
        assert!(list.remove(a).is_none());
        assert!(!list.move_to_front(a));
        assert_eq!(list.get(b).map(|e| e.key()), Some("b"));
    }

    #[test]
    fn test_drain_returns_front_to_back() {
        let mut list = RecencyList::new();
        for key in ["a", "b", "c"] {
            list.push_front(entry(key));
        }

        let drained: Vec<_> = list.drain().iter().map(|e| e.key().to_string()).collect();
        assert_eq!(drained, ["c", "b", "a"]);
        assert!(list.is_empty());
        assert!(list.front().is_none());
    }

    #[test]
    fn test_order_after_multiple_moves() {
        let mut list = RecencyList::new();
        let a = list.push_front(entry("a"));
        let b = list.push_front(entry("b"));
        let c = list.push_front(entry("c"));

        list.move_to_front(a);
        list.move_to_front(c);
        list.move_to_front(b);

        assert_eq!(keys(&list), ["b", "c", "a"]);
        assert_eq!(list.pop_back().map(|e| e.key().to_string()), Some("a".into()));
        assert_eq!(list.pop_back().map(|e| e.key().to_string()), Some("c".into()));
        assert_eq!(list.pop_back().map(|e| e.key().to_string()), Some("b".into()));
    }
}
