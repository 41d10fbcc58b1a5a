//! Bounded identifier-to-row-index cache.
//!
//! Rows scrolled past are remembered here so `index_of` can answer
//! without a query. Eviction is strict insertion order: updating an
//! entry or reading it never refreshes its position in the eviction
//! queue. This is deliberately not an LRU; scroll patterns revisit
//! nearby rows constantly and refreshing on access would let a small
//! hot window pin the whole cache.

use std::collections::VecDeque;

use ahash::AHashMap;
use entitygrid_core::types::Id;

/// Maps row identifiers to their absolute index in the current view.
///
/// Bounded: once `capacity` entries are held, inserting a new
/// identifier evicts the oldest-inserted one.
#[derive(Debug)]
pub struct PositionCache {
    capacity: usize,
    index_of: AHashMap<Id, usize>,
    insertion_order: VecDeque<Id>,
}

impl PositionCache {
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            capacity,
            index_of: AHashMap::with_capacity(capacity),
            insertion_order: VecDeque::with_capacity(capacity),
        }
    }

    /// Records the index of an identifier.
    ///
    /// An identifier already present keeps its place in the eviction
    /// queue; only its index is updated.
    pub fn insert(&mut self, id: Id, index: usize) {
        if let Some(slot) = self.index_of.get_mut(&id) {
            *slot = index;
            return;
        }
        if self.index_of.len() == self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.index_of.remove(&oldest);
            }
        }
        self.insertion_order.push_back(id.clone());
        self.index_of.insert(id, index);
    }

    /// Looks up the cached index for an identifier. Reading does not
    /// affect eviction order.
    #[must_use]
    pub fn get(&self, id: &Id) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.index_of.clear();
        self.insertion_order.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index_of.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_of.is_empty()
    }
}
