//! Bounded cache of materialized items.
//!
//! Items are shared as `Arc<EntityItem>` so repeated lookups of the
//! same row return the same instance while it stays cached. The cache
//! is bounded and evicting; an evicted item is simply re-materialized
//! on the next lookup with fresh store state.

use std::sync::Arc;

use entitygrid_core::types::Id;
use quick_cache::sync::Cache;

use crate::error::Result;
use crate::item::EntityItem;

pub struct ItemCache {
    inner: Cache<Id, Arc<EntityItem>>,
}

impl ItemCache {
    /// Creates a cache holding roughly `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    /// The cached item for an identifier, if present.
    #[must_use]
    pub fn get(&self, id: &Id) -> Option<Arc<EntityItem>> {
        self.inner.get(id)
    }

    /// Returns the cached item or materializes it via `load`.
    ///
    /// A `load` that finds no row yields `Ok(None)`; neither misses nor
    /// load failures are cached, so a later call retries.
    pub fn get_or_load(
        &self,
        id: &Id,
        load: impl FnOnce() -> Result<Option<Arc<EntityItem>>>,
    ) -> Result<Option<Arc<EntityItem>>> {
        if let Some(item) = self.inner.get(id) {
            return Ok(Some(item));
        }
        let Some(item) = load()? else {
            return Ok(None);
        };
        self.inner.insert(id.clone(), Arc::clone(&item));
        Ok(Some(item))
    }

    /// Caches an item the caller already materialized.
    pub fn insert(&self, id: Id, item: Arc<EntityItem>) {
        self.inner.insert(id, item);
    }

    /// Forgets one identifier. Handles already handed out keep working
    /// on their existing state.
    pub fn remove(&self, id: &Id) {
        self.inner.remove(id);
    }

    /// Forgets everything.
    pub fn clear(&self) {
        self.inner.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ItemCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemCache")
            .field("len", &self.inner.len())
            .finish()
    }
}
