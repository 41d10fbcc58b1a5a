use std::sync::Arc;

use entitygrid_core::filter::Predicate;
use entitygrid_core::metadata::EntityDescriptor;
use entitygrid_core::record::Record;
use entitygrid_core::types::Id;

use crate::error::Result;
use crate::query::QuerySpec;

/// One unit of work against the backing store.
///
/// Implementations synchronize internally; a session handle is shared
/// behind an [`Arc`] and called from whichever thread holds the
/// container. All failures surface as
/// [`ContainerError`](crate::error::ContainerError), with backend
/// faults wrapped transparently via `anyhow`.
pub trait PersistenceSession: Send + Sync {
    /// Ensures a transaction is open, beginning one if necessary.
    /// Joining an already-open transaction is a no-op.
    fn begin_or_join(&self) -> Result<()>;

    /// Loads one record by identifier. `Ok(None)` when absent.
    fn get(&self, entity: &str, id: &Id) -> Result<Option<Record>>;

    /// Persists a new record and returns its identifier. When the
    /// record's identifier properties are null the backend assigns one.
    fn save(&self, entity: &str, record: &Record) -> Result<Id>;

    /// Replaces the stored record, enforcing optimistic locking: the
    /// carried version must equal the stored version or the call fails
    /// with [`ContainerError::Conflict`](crate::error::ContainerError::Conflict).
    /// Returns the stored record with its version advanced.
    fn update(&self, entity: &str, id: &Id, record: &Record) -> Result<Record>;

    /// Deletes one record. Returns `false` when nothing was stored
    /// under the identifier.
    fn delete(&self, entity: &str, id: &Id) -> Result<bool>;

    /// Runs a windowed query and returns full records in query order.
    fn fetch(&self, query: &QuerySpec) -> Result<Vec<Record>>;

    /// Counts records matching the predicates.
    fn count(&self, entity: &str, predicates: &[Predicate]) -> Result<u64>;

    /// Runs a windowed query projected to identifiers only.
    fn fetch_ids(&self, query: &QuerySpec) -> Result<Vec<Id>>;

    /// Commits the open transaction, if any.
    fn commit(&self) -> Result<()>;

    /// Rolls back the open transaction, if any.
    fn rollback(&self) -> Result<()>;
}

/// Hands out the session bound to the current scope.
///
/// A provider typically returns the same session for the lifetime of a
/// request or UI interaction and a fresh one afterward; the container
/// asks for the session on every operation rather than holding one.
pub trait SessionProvider: Send + Sync {
    fn session(&self) -> Result<Arc<dyn PersistenceSession>>;
}

/// Resolves entity names to their property metadata.
pub trait MetadataResolver: Send + Sync {
    /// Looks up the descriptor for an entity. Unknown names fail with
    /// [`ContainerError::UnknownEntity`](crate::error::ContainerError::UnknownEntity).
    fn descriptor(&self, entity: &str) -> Result<Arc<EntityDescriptor>>;
}
