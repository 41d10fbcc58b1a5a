//! Lazy container over one entity type.
//!
//! [`EntityContainer`] is what a grid binds to: it answers size, index,
//! and cursor questions through windowed queries instead of loading the
//! entity set, and it funnels every mutation through the persistence
//! session, the audit observers, and the item-set listeners.
//!
//! All derived state (position cache, page buffers, cached size and
//! terminal ids, materialized items) belongs to one *epoch*. Any change
//! to the visible row set -- a mutation, a filter or sort change, an
//! explicit [`refresh`](EntityContainer::refresh) -- bumps the epoch,
//! drops all of it, and notifies listeners. Within an epoch, repeated
//! lookups of the same row return the same shared item.

use std::sync::Arc;

use entitygrid_core::filter::{FilterSpec, Predicate};
use entitygrid_core::metadata::{EntityDescriptor, PropertyKind};
use entitygrid_core::ordering::{build_order, ScanDirection, SortKey};
use entitygrid_core::record::Record;
use entitygrid_core::types::Id;
use parking_lot::Mutex;

use crate::config::{ContainerConfig, TransactionOwnership};
use crate::error::{ContainerError, Result};
use crate::item::EntityItem;
use crate::item_cache::ItemCache;
use crate::observer::{AuditObserver, CompositeAuditObserver, ItemSetListener};
use crate::page_buffer::{view_index, PageBuffer};
use crate::position_cache::PositionCache;
use crate::query::{
    assemble_predicates, build_predicate, fetch_ids, fetch_page, fetch_single_capped,
};
use crate::traits::{MetadataResolver, PersistenceSession, SessionProvider};

/// Everything that dies when the epoch changes, behind one lock.
struct ContainerState {
    filters: Vec<FilterSpec>,
    sort_keys: Vec<SortKey>,
    epoch: u64,
    position_cache: PositionCache,
    forward_buffer: Option<PageBuffer>,
    backward_buffer: Option<PageBuffer>,
    cached_size: Option<u64>,
    /// `Some(None)` caches "the view is empty".
    cached_first: Option<Option<Id>>,
    cached_last: Option<Option<Id>>,
}

impl ContainerState {
    fn buffer(&self, scan: ScanDirection) -> Option<&PageBuffer> {
        match scan {
            ScanDirection::Forward => self.forward_buffer.as_ref(),
            ScanDirection::Backward => self.backward_buffer.as_ref(),
        }
    }

    fn buffer_mut(&mut self, scan: ScanDirection) -> &mut Option<PageBuffer> {
        match scan {
            ScanDirection::Forward => &mut self.forward_buffer,
            ScanDirection::Backward => &mut self.backward_buffer,
        }
    }
}

/// Windowed, filterable view of one entity type.
///
/// Coordinates:
/// - a [`SessionProvider`] for every store round trip
/// - a [`MetadataResolver`] for property kinds and key shape
/// - [`CompositeAuditObserver`]: mutation audit fan-out
/// - [`ItemSetListener`]s: row-set change notification
///
/// Reads are lazy and cached per epoch; mutations commit (under
/// container-owned transactions), audit, invalidate, and notify.
pub struct EntityContainer {
    entity: String,
    descriptor: Arc<EntityDescriptor>,
    config: ContainerConfig,
    provider: Arc<dyn SessionProvider>,
    resolver: Arc<dyn MetadataResolver>,
    audit: Arc<CompositeAuditObserver>,
    state: Mutex<ContainerState>,
    listeners: Mutex<Vec<Arc<dyn ItemSetListener>>>,
    items: ItemCache,
}

impl EntityContainer {
    /// Creates a container for `entity`, resolving its descriptor
    /// immediately so an unknown entity fails here and not mid-render.
    pub fn new(
        entity: &str,
        config: ContainerConfig,
        provider: Arc<dyn SessionProvider>,
        resolver: Arc<dyn MetadataResolver>,
        audit: Arc<CompositeAuditObserver>,
    ) -> Result<Self> {
        let descriptor = resolver.descriptor(entity)?;
        Ok(Self {
            entity: entity.to_string(),
            descriptor,
            items: ItemCache::new(config.item_cache_capacity),
            state: Mutex::new(ContainerState {
                filters: Vec::new(),
                sort_keys: Vec::new(),
                epoch: 0,
                position_cache: PositionCache::new(config.position_cache_capacity),
                forward_buffer: None,
                backward_buffer: None,
                cached_size: None,
                cached_first: None,
                cached_last: None,
            }),
            listeners: Mutex::new(Vec::new()),
            config,
            provider,
            resolver,
            audit,
        })
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// Current epoch. Bumped on every row-set invalidation; anything
    /// derived under an older epoch is stale.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Declared property names, in declared order.
    #[must_use]
    pub fn properties(&self) -> Vec<String> {
        self.descriptor
            .property_names()
            .map(str::to_string)
            .collect()
    }

    /// Properties that can appear in sort keys: the scalar kinds.
    /// References sort by nothing meaningful, so they are excluded.
    #[must_use]
    pub fn sortable_properties(&self) -> Vec<String> {
        self.descriptor
            .properties
            .iter()
            .filter(|p| {
                !matches!(
                    p.kind,
                    PropertyKind::Association { .. } | PropertyKind::Collection { .. }
                )
            })
            .map(|p| p.name.clone())
            .collect()
    }

    // --- Size and indexed access ---

    /// Number of rows in the filtered view. Counted once per epoch.
    pub fn size(&self) -> Result<u64> {
        let mut state = self.state.lock();
        self.size_locked(&mut state)
    }

    /// The identifier of the row at `index` in the ascending view, or
    /// `None` past the end. Serves from the page buffer when the index
    /// is inside the last fetched window.
    pub fn id_at(&self, index: usize) -> Result<Option<Id>> {
        let mut state = self.state.lock();
        self.id_at_locked(&mut state, index)
    }

    /// The item at `index` in the ascending view.
    pub fn item_at(&self, index: usize) -> Result<Option<Arc<EntityItem>>> {
        match self.id_at(index)? {
            Some(id) => self.item_for(&id),
            None => Ok(None),
        }
    }

    /// One window of full records in view order, for bulk reads like
    /// exports. Goes straight to the store; nothing is materialized or
    /// cached on the way.
    pub fn records(&self, offset: usize, limit: usize) -> Result<Vec<Record>> {
        let state = self.state.lock();
        let session = self.read_session()?;
        let predicates = self.predicates_locked(&state)?;
        let order = build_order(&state.sort_keys, &self.descriptor, ScanDirection::Forward);
        fetch_page(
            session.as_ref(),
            &self.entity,
            &predicates,
            &order,
            offset,
            limit,
        )
    }

    /// Materializes the item for an identifier, or returns the shared
    /// instance already materialized in this epoch.
    ///
    /// Loads by identifier only: a row excluded by the active filters
    /// is still reachable here, exactly like following a direct link.
    pub fn item_for(&self, id: &Id) -> Result<Option<Arc<EntityItem>>> {
        self.items.get_or_load(id, || {
            let session = self.read_session()?;
            let Some(record) = session.get(&self.entity, id)? else {
                return Ok(None);
            };
            Ok(Some(Arc::new(EntityItem::new(
                self.entity.clone(),
                id.clone(),
                record,
            ))))
        })
    }

    /// Whether a row with this identifier exists in the store.
    pub fn contains(&self, id: &Id) -> Result<bool> {
        if self.items.get(id).is_some() {
            return Ok(true);
        }
        let session = self.read_session()?;
        Ok(session.get(&self.entity, id)?.is_some())
    }

    /// Absolute index of an identifier in the ascending view, or `None`
    /// when the row is not in the view. Answers from the position cache
    /// when it can; otherwise scans id pages forward, remembering every
    /// position it passes.
    pub fn index_of(&self, id: &Id) -> Result<Option<usize>> {
        let mut state = self.state.lock();
        self.index_of_locked(&mut state, id)
    }

    // --- Cursor navigation ---

    /// Identifier of the first row of the view.
    pub fn first_id(&self) -> Result<Option<Id>> {
        self.terminal_id(ScanDirection::Forward)
    }

    /// Identifier of the last row of the view.
    pub fn last_id(&self) -> Result<Option<Id>> {
        self.terminal_id(ScanDirection::Backward)
    }

    pub fn is_first(&self, id: &Id) -> Result<bool> {
        Ok(self.first_id()?.as_ref() == Some(id))
    }

    pub fn is_last(&self, id: &Id) -> Result<bool> {
        Ok(self.last_id()?.as_ref() == Some(id))
    }

    /// The identifier after `id` in the view, or `None` at the end (or
    /// when `id` is not in the view at all).
    pub fn next_id(&self, id: &Id) -> Result<Option<Id>> {
        self.neighbor_id(id, ScanDirection::Forward)
    }

    /// The identifier before `id` in the view. Runs the successor
    /// algorithm over the reversed ordering; nothing else differs.
    pub fn previous_id(&self, id: &Id) -> Result<Option<Id>> {
        self.neighbor_id(id, ScanDirection::Backward)
    }

    // --- Filters ---

    /// The active filter set.
    #[must_use]
    pub fn filters(&self) -> Vec<FilterSpec> {
        self.state.lock().filters.clone()
    }

    /// Adds a filter and invalidates the view.
    ///
    /// The filter's property path is validated now, so a misconfigured
    /// path fails the caller that introduced it instead of every later
    /// query. A filter equal to one already present is a no-op.
    pub fn add_filter(&self, filter: FilterSpec) -> Result<()> {
        {
            let mut state = self.state.lock();
            // Surface configuration errors immediately; whether the
            // value parses into a predicate does not matter yet.
            build_predicate(&filter, &self.descriptor, self.resolver.as_ref())?;
            if state.filters.contains(&filter) {
                return Ok(());
            }
            tracing::debug!(entity = %self.entity, property = %filter.property, "filter added");
            state.filters.push(filter);
            self.invalidate_locked(&mut state);
        }
        self.notify_listeners();
        Ok(())
    }

    /// Drops every filter targeting `property` (by path head or full
    /// path). Listeners fire only when something was removed.
    pub fn remove_filters_for(&self, property: &str) {
        let removed = {
            let mut state = self.state.lock();
            let before = state.filters.len();
            state
                .filters
                .retain(|f| f.property != property && head_of(&f.property) != property);
            let removed = state.filters.len() != before;
            if removed {
                self.invalidate_locked(&mut state);
            }
            removed
        };
        if removed {
            self.notify_listeners();
        }
    }

    /// Drops the whole filter set.
    pub fn clear_filters(&self) {
        let removed = {
            let mut state = self.state.lock();
            if state.filters.is_empty() {
                false
            } else {
                state.filters.clear();
                self.invalidate_locked(&mut state);
                true
            }
        };
        if removed {
            self.notify_listeners();
        }
    }

    // --- Sorting ---

    /// The explicit sort keys (the identifier tie-break is implicit).
    #[must_use]
    pub fn sort_keys(&self) -> Vec<SortKey> {
        self.state.lock().sort_keys.clone()
    }

    /// Replaces the sort keys and invalidates the view.
    ///
    /// Every key must name a declared, sortable property; on error the
    /// previous sort stays in effect.
    pub fn sort(&self, keys: Vec<SortKey>) -> Result<()> {
        {
            let mut state = self.state.lock();
            for key in &keys {
                let property = self.descriptor.property(&key.property).ok_or_else(|| {
                    ContainerError::UnknownProperty {
                        entity: self.entity.clone(),
                        property: key.property.clone(),
                    }
                })?;
                if matches!(
                    property.kind,
                    PropertyKind::Association { .. } | PropertyKind::Collection { .. }
                ) {
                    return Err(ContainerError::Unsupported(format!(
                        "property '{}' of entity '{}' is a reference and cannot be sorted on",
                        key.property, self.entity
                    )));
                }
            }
            tracing::debug!(entity = %self.entity, keys = keys.len(), "sort changed");
            state.sort_keys = keys;
            self.invalidate_locked(&mut state);
        }
        self.notify_listeners();
        Ok(())
    }

    // --- Mutations ---

    /// Persists a new row. A record whose identifier properties are
    /// null gets one assigned by the store.
    pub fn add_record(&self, record: Record) -> Result<Id> {
        let session = self.mutation_session()?;
        let id = match session.save(&self.entity, &record) {
            Ok(id) => id,
            Err(err) => {
                self.abort_mutation(session.as_ref());
                return Err(err);
            }
        };
        self.finish_mutation(session.as_ref())?;

        if !self.audit.is_empty() {
            self.audit
                .on_created(&self.entity, &id, &record.detail_string(&self.descriptor));
        }
        tracing::info!(entity = %self.entity, id = %id, "record added");
        self.invalidate_and_notify();
        Ok(id)
    }

    /// Persists a blank row (every declared property null) and returns
    /// its assigned identifier. The add-row button of a grid.
    pub fn add_new(&self) -> Result<Id> {
        self.add_record(Record::blank(&self.descriptor))
    }

    /// Persists new property values for one row.
    ///
    /// The record must carry the version it was loaded at; a stale
    /// version fails with [`ContainerError::Conflict`] and changes
    /// nothing. Returns the stored record with its advanced version.
    pub fn update_record(&self, id: &Id, record: &Record) -> Result<Record> {
        let session = self.mutation_session()?;
        let stored = match session.update(&self.entity, id, record) {
            Ok(stored) => stored,
            Err(err) => {
                self.abort_mutation(session.as_ref());
                return Err(err);
            }
        };
        self.finish_mutation(session.as_ref())?;

        if !self.audit.is_empty() {
            self.audit
                .on_updated(&self.entity, id, &stored.detail_string(&self.descriptor));
        }
        tracing::info!(entity = %self.entity, id = %id, version = stored.version, "record updated");
        self.invalidate_and_notify();
        Ok(stored)
    }

    /// Persists an item's current state and refreshes the handle with
    /// the stored record, so the caller keeps editing at the new
    /// version.
    pub fn update_item(&self, item: &EntityItem) -> Result<()> {
        let stored = self.update_record(item.id(), &item.record())?;
        item.replace_record(stored);
        Ok(())
    }

    /// Deletes one row. Returns `false` (and touches nothing) when no
    /// row has this identifier.
    pub fn remove_record(&self, id: &Id) -> Result<bool> {
        let session = self.mutation_session()?;
        let removed: Result<Option<Record>> = (|| {
            let Some(existing) = session.get(&self.entity, id)? else {
                return Ok(None);
            };
            if session.delete(&self.entity, id)? {
                Ok(Some(existing))
            } else {
                Ok(None)
            }
        })();

        let existing = match removed {
            Ok(Some(existing)) => existing,
            Ok(None) => return Ok(false),
            Err(err) => {
                self.abort_mutation(session.as_ref());
                return Err(err);
            }
        };
        self.finish_mutation(session.as_ref())?;

        if !self.audit.is_empty() {
            self.audit
                .on_removed(&self.entity, id, &existing.detail_string(&self.descriptor));
        }
        tracing::info!(entity = %self.entity, id = %id, "record removed");
        self.invalidate_and_notify();
        Ok(true)
    }

    // --- Listeners and invalidation ---

    /// Registers a row-set listener. Listeners fire in registration
    /// order, after the container released its internal lock.
    pub fn add_listener(&self, listener: Arc<dyn ItemSetListener>) {
        self.listeners.lock().push(listener);
    }

    /// Unregisters a listener (by instance).
    pub fn remove_listener(&self, listener: &Arc<dyn ItemSetListener>) {
        self.listeners
            .lock()
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    /// Drops every cache and notifies listeners. The escape hatch when
    /// the underlying data changed behind the container's back.
    pub fn refresh(&self) {
        self.invalidate_and_notify();
    }
}

// Internal helpers. The `_locked` functions take the already-held state
// so no path ever locks twice.
impl EntityContainer {
    fn read_session(&self) -> Result<Arc<dyn PersistenceSession>> {
        let session = self.provider.session()?;
        session.begin_or_join()?;
        Ok(session)
    }

    fn mutation_session(&self) -> Result<Arc<dyn PersistenceSession>> {
        self.read_session()
    }

    /// Closes out a successful mutation. Under container-owned
    /// transactions this commits and immediately reopens, so the change
    /// is durable and later reads still run inside a transaction.
    fn finish_mutation(&self, session: &dyn PersistenceSession) -> Result<()> {
        if self.config.transaction_ownership == TransactionOwnership::ContainerOwned {
            if let Err(err) = session.commit() {
                self.abort_mutation(session);
                return Err(err);
            }
            session.begin_or_join()?;
        }
        Ok(())
    }

    /// Rolls back after a failed mutation when the container owns the
    /// transaction. Rollback failures are logged, not propagated; the
    /// original error is what the caller needs to see.
    fn abort_mutation(&self, session: &dyn PersistenceSession) {
        if self.config.transaction_ownership == TransactionOwnership::ContainerOwned {
            if let Err(err) = session.rollback() {
                tracing::warn!(entity = %self.entity, error = %err, "rollback failed");
            }
        }
    }

    fn predicates_locked(&self, state: &ContainerState) -> Result<Vec<Predicate>> {
        assemble_predicates(&state.filters, &self.descriptor, self.resolver.as_ref())
    }

    fn size_locked(&self, state: &mut ContainerState) -> Result<u64> {
        if let Some(size) = state.cached_size {
            return Ok(size);
        }
        let session = self.read_session()?;
        let predicates = self.predicates_locked(state)?;
        let size = session.count(&self.entity, &predicates)?;
        state.cached_size = Some(size);
        tracing::debug!(entity = %self.entity, size, "view size counted");
        Ok(size)
    }

    fn size_usize_locked(&self, state: &mut ContainerState) -> Result<usize> {
        let size = self.size_locked(state)?;
        Ok(usize::try_from(size).unwrap_or(usize::MAX))
    }

    fn id_at_locked(&self, state: &mut ContainerState, index: usize) -> Result<Option<Id>> {
        if let Some(buffer) = &state.forward_buffer {
            if let Some(id) = buffer.get(index) {
                return Ok(Some(id.clone()));
            }
        }

        let session = self.read_session()?;
        let predicates = self.predicates_locked(state)?;
        let order = build_order(&state.sort_keys, &self.descriptor, ScanDirection::Forward);
        let ids = fetch_ids(
            session.as_ref(),
            &self.entity,
            &predicates,
            &order,
            index,
            self.config.page_size,
        )?;

        for (offset, id) in ids.iter().enumerate() {
            state.position_cache.insert(id.clone(), index + offset);
        }
        let first = ids.first().cloned();
        state.forward_buffer = Some(PageBuffer::new(ScanDirection::Forward, index, ids));
        Ok(first)
    }

    fn index_of_locked(&self, state: &mut ContainerState, id: &Id) -> Result<Option<usize>> {
        if let Some(index) = state.position_cache.get(id) {
            return Ok(Some(index));
        }

        let session = self.read_session()?;
        let predicates = self.predicates_locked(state)?;
        let order = build_order(&state.sort_keys, &self.descriptor, ScanDirection::Forward);
        let mut offset = 0usize;
        loop {
            let ids = fetch_ids(
                session.as_ref(),
                &self.entity,
                &predicates,
                &order,
                offset,
                self.config.page_size,
            )?;
            if ids.is_empty() {
                return Ok(None);
            }
            let mut found = None;
            for (i, candidate) in ids.iter().enumerate() {
                state.position_cache.insert(candidate.clone(), offset + i);
                if found.is_none() && candidate == id {
                    found = Some(offset + i);
                }
            }
            if found.is_some() {
                return Ok(found);
            }
            if ids.len() < self.config.page_size {
                return Ok(None);
            }
            offset += ids.len();
        }
    }

    fn terminal_id(&self, scan: ScanDirection) -> Result<Option<Id>> {
        let mut state = self.state.lock();
        let cached = match scan {
            ScanDirection::Forward => &state.cached_first,
            ScanDirection::Backward => &state.cached_last,
        };
        if let Some(id) = cached {
            return Ok(id.clone());
        }

        let session = self.read_session()?;
        let predicates = self.predicates_locked(&state)?;
        let order = build_order(&state.sort_keys, &self.descriptor, scan);
        let id = fetch_single_capped(session.as_ref(), &self.entity, &predicates, &order)?;
        match scan {
            ScanDirection::Forward => state.cached_first = Some(id.clone()),
            ScanDirection::Backward => state.cached_last = Some(id.clone()),
        }
        Ok(id)
    }

    /// Successor of `id` in scan order.
    ///
    /// Three stages, cheapest first: the direction's page buffer, the
    /// position cache (via `index_of`), then a fresh window fetched
    /// right after the row, which becomes the new page buffer.
    fn neighbor_id(&self, id: &Id, scan: ScanDirection) -> Result<Option<Id>> {
        let mut state = self.state.lock();

        // Step 1: Buffer fast path.
        let buffered_scan_index = match state.buffer(scan) {
            Some(buffer) => {
                if let Some(next) = buffer.successor_of(id) {
                    return Ok(Some(next.clone()));
                }
                // The row may still be buffered as the window's last
                // element; its index saves the lookup below.
                buffer.scan_index_of(id)
            }
            None => None,
        };

        // Step 2: Resolve the row's scan-space index.
        let scan_index = match buffered_scan_index {
            Some(index) => index,
            None => {
                let Some(view) = self.index_of_locked(&mut state, id)? else {
                    return Ok(None);
                };
                match scan {
                    ScanDirection::Forward => view,
                    ScanDirection::Backward => {
                        let total = self.size_usize_locked(&mut state)?;
                        if view >= total {
                            return Ok(None);
                        }
                        total - 1 - view
                    }
                }
            }
        };

        // Step 3: Fetch a fresh window right after the row and make it
        // the direction's page buffer.
        let session = self.read_session()?;
        let predicates = self.predicates_locked(&state)?;
        let order = build_order(&state.sort_keys, &self.descriptor, scan);
        let first_index = scan_index + 1;
        let ids = fetch_ids(
            session.as_ref(),
            &self.entity,
            &predicates,
            &order,
            first_index,
            self.config.page_size,
        )?;

        // Step 4: Remember view positions for everything fetched.
        match scan {
            ScanDirection::Forward => {
                for (i, candidate) in ids.iter().enumerate() {
                    state.position_cache.insert(candidate.clone(), first_index + i);
                }
            }
            ScanDirection::Backward => {
                let total = self.size_usize_locked(&mut state)?;
                for (i, candidate) in ids.iter().enumerate() {
                    if let Some(view) = view_index(ScanDirection::Backward, first_index + i, total)
                    {
                        state.position_cache.insert(candidate.clone(), view);
                    }
                }
            }
        }

        let next = ids.first().cloned();
        *state.buffer_mut(scan) = Some(PageBuffer::new(scan, first_index, ids));
        Ok(next)
    }

    fn invalidate_locked(&self, state: &mut ContainerState) {
        state.epoch += 1;
        state.position_cache.clear();
        state.forward_buffer = None;
        state.backward_buffer = None;
        state.cached_size = None;
        state.cached_first = None;
        state.cached_last = None;
        self.items.clear();
        tracing::debug!(entity = %self.entity, epoch = state.epoch, "view invalidated");
    }

    fn invalidate_and_notify(&self) {
        {
            let mut state = self.state.lock();
            self.invalidate_locked(&mut state);
        }
        self.notify_listeners();
    }

    /// Notifies listeners in registration order. The state lock is
    /// never held here, so a listener may call straight back into the
    /// container.
    fn notify_listeners(&self) {
        let listeners: Vec<Arc<dyn ItemSetListener>> = self.listeners.lock().clone();
        for listener in listeners {
            listener.item_set_changed();
        }
    }
}

impl std::fmt::Debug for EntityContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContainer")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

fn head_of(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}
