//! Materialized row items and their property handles.
//!
//! An [`EntityItem`] is the container's view of one record, shared as
//! `Arc<EntityItem>` so that every grid cell bound to the same row sees
//! the same state. Writes go through the item into its record; the
//! container persists the record when the row is saved.

use std::sync::Arc;

use entitygrid_core::record::Record;
use entitygrid_core::types::{Id, Value};
use parking_lot::RwLock;

/// One row of an entity, held behind a lock so property handles can
/// read and write it concurrently.
#[derive(Debug)]
pub struct EntityItem {
    entity: String,
    id: Id,
    record: RwLock<Record>,
}

impl EntityItem {
    #[must_use]
    pub fn new(entity: impl Into<String>, id: Id, record: Record) -> Self {
        Self {
            entity: entity.into(),
            id,
            record: RwLock::new(record),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Snapshot of the current record state.
    #[must_use]
    pub fn record(&self) -> Record {
        self.record.read().clone()
    }

    /// The optimistic-lock version the item currently carries.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.record.read().version
    }

    /// Reads one property. Properties never written are [`Value::Null`].
    #[must_use]
    pub fn value(&self, property: &str) -> Value {
        self.record
            .read()
            .value(property)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Writes one property on the in-memory record. The change is not
    /// persisted until the row is saved through its container.
    pub fn set_value(&self, property: &str, value: Value) {
        self.record.write().set_value(property, value);
    }

    /// Replaces the whole record, e.g. after the store reloaded the
    /// row. Existing property handles observe the new state.
    pub fn replace_record(&self, record: Record) {
        *self.record.write() = record;
    }

    /// A handle bound to one property of this item.
    #[must_use]
    pub fn property(self: &Arc<Self>, name: impl Into<String>) -> ItemProperty {
        ItemProperty {
            item: Arc::clone(self),
            name: name.into(),
        }
    }
}

/// A named property of a shared item. Grid cells hold one of these per
/// column and read and write through it.
#[derive(Debug, Clone)]
pub struct ItemProperty {
    item: Arc<EntityItem>,
    name: String,
}

impl ItemProperty {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> Value {
        self.item.value(&self.name)
    }

    pub fn set_value(&self, value: Value) {
        self.item.set_value(&self.name, value);
    }
}
