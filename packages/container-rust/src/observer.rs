//! Change listeners and audit observers.
//!
//! Defines [`ItemSetListener`] for reacting to visible-row-set changes in a
//! container, [`AuditObserver`] for recording entity mutations, and
//! [`CompositeAuditObserver`] which fans out audit notifications to
//! multiple observers.

use std::sync::Arc;

use entitygrid_core::types::Id;

/// Listener for changes to the set of visible rows.
///
/// Fired whenever a mutation, filter change, or sort change invalidates
/// the container's caches; grid components re-pull sizes and pages in
/// response. Notifications are infallible and are delivered outside the
/// container's internal lock, so a listener may call back into the
/// container.
///
/// Used as `Arc<dyn ItemSetListener>`.
pub trait ItemSetListener: Send + Sync {
    /// Called after the container's row set may have changed.
    fn item_set_changed(&self);
}

/// Observer for entity mutations flowing through a container.
///
/// Implementations write audit trails, fire domain events, or keep
/// derived data in sync. `details` is a human-readable property dump in
/// `[name=value], [name=value]` form.
///
/// Used as `Arc<dyn AuditObserver>`.
pub trait AuditObserver: Send + Sync {
    /// Called after a new record is persisted.
    fn on_created(&self, entity: &str, id: &Id, details: &str);

    /// Called after an existing record is updated.
    fn on_updated(&self, entity: &str, id: &Id, details: &str);

    /// Called after a record is deleted.
    fn on_removed(&self, entity: &str, id: &Id, details: &str);
}

/// Composite observer that fans out to multiple observers.
///
/// Iterates observers in registration order for each notification,
/// enabling multiple independent audit sinks for a single mutation.
#[derive(Default)]
pub struct CompositeAuditObserver {
    observers: Vec<Arc<dyn AuditObserver>>,
}

impl CompositeAuditObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn AuditObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn AuditObserver>) {
        self.observers.push(observer);
    }

    /// Whether any observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl AuditObserver for CompositeAuditObserver {
    fn on_created(&self, entity: &str, id: &Id, details: &str) {
        for observer in &self.observers {
            observer.on_created(entity, id, details);
        }
    }

    fn on_updated(&self, entity: &str, id: &Id, details: &str) {
        for observer in &self.observers {
            observer.on_updated(entity, id, details);
        }
    }

    fn on_removed(&self, entity: &str, id: &Id, details: &str) {
        for observer in &self.observers {
            observer.on_removed(entity, id, details);
        }
    }
}

/// Audit observer that emits one structured log line per mutation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditObserver;

impl AuditObserver for TracingAuditObserver {
    fn on_created(&self, entity: &str, id: &Id, details: &str) {
        tracing::info!(entity = %entity, id = %id, details = %details, "created");
    }

    fn on_updated(&self, entity: &str, id: &Id, details: &str) {
        tracing::info!(entity = %entity, id = %id, details = %details, "updated");
    }

    fn on_removed(&self, entity: &str, id: &Id, details: &str) {
        tracing::info!(entity = %entity, id = %id, details = %details, "removed");
    }
}
