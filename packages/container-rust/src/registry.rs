//! Registry for creating fully-wired [`EntityContainer`] instances.
//!
//! [`ContainerRegistry`] is the dependency injection point of the crate:
//! it holds the shared [`ContainerConfig`], the [`SessionProvider`], the
//! [`MetadataResolver`], and the registered audit observers, and hands
//! out one container per entity type with all of them connected. There
//! are no global statics; an application builds one registry and passes
//! it around.
//!
//! [`StaticMetadata`] is the code-first resolver for applications that
//! declare their entity model directly instead of deriving it from a
//! backend.

use std::sync::Arc;

use dashmap::DashMap;
use entitygrid_core::metadata::EntityDescriptor;

use crate::config::ContainerConfig;
use crate::container::EntityContainer;
use crate::error::{ContainerError, Result};
use crate::observer::{AuditObserver, CompositeAuditObserver};
use crate::traits::{MetadataResolver, SessionProvider};

// ---------------------------------------------------------------------------
// StaticMetadata
// ---------------------------------------------------------------------------

/// Metadata resolver backed by descriptors registered in code.
pub struct StaticMetadata {
    descriptors: DashMap<String, Arc<EntityDescriptor>>,
}

impl StaticMetadata {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: DashMap::new(),
        }
    }

    /// Registers an entity descriptor, replacing any previous descriptor
    /// for the same entity name.
    pub fn register(&self, descriptor: EntityDescriptor) {
        self.descriptors
            .insert(descriptor.entity.clone(), Arc::new(descriptor));
    }
}

impl Default for StaticMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataResolver for StaticMetadata {
    fn descriptor(&self, entity: &str) -> Result<Arc<EntityDescriptor>> {
        self.descriptors
            .get(entity)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ContainerError::UnknownEntity(entity.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ContainerRegistry
// ---------------------------------------------------------------------------

/// Registry handing out one wired [`EntityContainer`] per entity type.
///
/// Containers are created on first request and cached, so every caller
/// asking for the same entity shares one adapter (and therefore one set
/// of caches and listeners). Each container gets its own composite
/// observer assembled from the registered list.
pub struct ContainerRegistry {
    config: ContainerConfig,
    provider: Arc<dyn SessionProvider>,
    resolver: Arc<dyn MetadataResolver>,
    observers: Vec<Arc<dyn AuditObserver>>,
    containers: DashMap<String, Arc<EntityContainer>>,
}

impl ContainerRegistry {
    /// Creates a registry with the given configuration and backends.
    #[must_use]
    pub fn new(
        config: ContainerConfig,
        provider: Arc<dyn SessionProvider>,
        resolver: Arc<dyn MetadataResolver>,
        observers: Vec<Arc<dyn AuditObserver>>,
    ) -> Self {
        Self {
            config,
            provider,
            resolver,
            observers,
            containers: DashMap::new(),
        }
    }

    /// The shared configuration containers are created with.
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Returns the container for `entity`, assembling it on first use.
    ///
    /// Fails with [`ContainerError::UnknownEntity`] when the metadata
    /// resolver does not know the entity, before anything is cached.
    pub fn container(&self, entity: &str) -> Result<Arc<EntityContainer>> {
        if let Some(existing) = self.containers.get(entity) {
            return Ok(Arc::clone(existing.value()));
        }

        let audit = Arc::new(CompositeAuditObserver::new(self.observers.clone()));
        let container = Arc::new(EntityContainer::new(
            entity,
            self.config.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.resolver),
            audit,
        )?);
        tracing::debug!(entity = %entity, "container assembled");

        // Two racing callers may both assemble; the map keeps the first
        // insert and both get the same instance back.
        let entry = self
            .containers
            .entry(entity.to_string())
            .or_insert(container);
        Ok(Arc::clone(entry.value()))
    }
}
