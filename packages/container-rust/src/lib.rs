//! `EntityGrid` Container — lazy, filterable entity adapter for data-bound grids.

pub mod config;
pub mod container;
pub mod error;
pub mod item;
pub mod item_cache;
pub mod memory;
pub mod observer;
pub mod page_buffer;
pub mod position_cache;
pub mod query;
pub mod registry;
pub mod traits;

pub use config::{ContainerConfig, TransactionOwnership};
pub use container::EntityContainer;
pub use error::{ContainerError, Result};
pub use item::{EntityItem, ItemProperty};
pub use memory::{MemoryBackend, MemorySession};
pub use observer::{
    AuditObserver, CompositeAuditObserver, ItemSetListener, TracingAuditObserver,
};
pub use query::QuerySpec;
pub use registry::{ContainerRegistry, StaticMetadata};
pub use traits::{MetadataResolver, PersistenceSession, SessionProvider};
