use entitygrid_core::Id;
use thiserror::Error;

/// Errors surfaced by container and session operations.
///
/// Configuration mistakes (unknown entities/properties, missing filtering
/// property, unsupported operations) fail fast at the call site. Malformed
/// filter *input* never lands here; it degrades inside predicate
/// construction. Backend and conflict failures propagate so the caller
/// can decide on retry or surfacing.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Entity type is not registered with the metadata resolver.
    #[error("unknown entity type '{0}'")]
    UnknownEntity(String),

    /// Property does not exist on the entity.
    #[error("unknown property '{property}' on entity '{entity}'")]
    UnknownProperty {
        /// Entity the lookup ran against.
        entity: String,
        /// The missing property name.
        property: String,
    },

    /// An association filter traversed to a target type that declares no
    /// filtering property.
    #[error("entity '{0}' declares no filtering property")]
    NoFilteringProperty(String),

    /// A filter path traversed more than one association hop.
    #[error("filter path '{0}' traverses more than one association")]
    PathTooDeep(String),

    /// Caller invoked an operation this ordering model cannot support.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Optimistic-lock conflict: the record changed since it was loaded.
    #[error("version conflict on '{entity}' id {id}: stored {stored}, update carried {carried}")]
    Conflict {
        /// Entity type of the contested record.
        entity: String,
        /// Identifier of the contested record.
        id: Id,
        /// Version currently stored.
        stored: u64,
        /// Version the rejected update carried.
        carried: u64,
    },

    /// A mutation targeted a record that no longer exists.
    #[error("record '{entity}' id {id} not found")]
    Missing {
        /// Entity type of the missing record.
        entity: String,
        /// Identifier that failed to resolve.
        id: Id,
    },

    /// Invalid configuration input (properties text, bad values).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure inside the persistence backend.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ContainerError>;
