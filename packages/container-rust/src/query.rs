//! Query planning and windowed execution.
//!
//! The planner turns the container's filter set into compiled
//! predicates, resolving association paths against entity metadata.
//! The executor functions describe one bounded window over the ordered,
//! filtered record set as a [`QuerySpec`] and run it through a
//! [`PersistenceSession`]; every access path in the container goes
//! through them, so no call ever fetches an unbounded result.

use entitygrid_core::filter::{FilterSpec, Predicate};
use entitygrid_core::metadata::{EntityDescriptor, PropertyKind};
use entitygrid_core::ordering::SortKey;
use entitygrid_core::record::Record;
use entitygrid_core::types::Id;
use serde::{Deserialize, Serialize};

use crate::error::{ContainerError, Result};
use crate::traits::{MetadataResolver, PersistenceSession};

/// One windowed query against a single entity type.
///
/// `order` is always the effective ordering (explicit keys plus the
/// identifier tie-break), so a session implementation applies it as
/// given and never needs entity metadata to page deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Entity type to query.
    pub entity: String,
    /// Conjunction of row predicates; empty matches everything.
    pub predicates: Vec<Predicate>,
    /// Effective ordering, tie-break included.
    pub order: Vec<SortKey>,
    /// Rows to skip, counted in `order`.
    pub offset: usize,
    /// Maximum rows to return. `None` only for count-style queries;
    /// the executor functions always set it.
    pub limit: Option<usize>,
}

/// Compiles one filter into a predicate against an entity.
///
/// Plain properties dispatch on their declared kind. An association
/// property (bare, or the head of a one-hop `association.property`
/// path) compiles to [`Predicate::Traverse`] around a predicate on the
/// referenced entity's property; bare association paths use the target
/// entity's configured filtering property.
///
/// `Ok(None)` means the filter contributes no predicate yet (malformed
/// numeric input). Misconfigured paths are errors: unknown properties,
/// scalar heads with a dotted tail, targets without a filtering
/// property, and paths that would traverse two associations.
pub fn build_predicate(
    filter: &FilterSpec,
    descriptor: &EntityDescriptor,
    resolver: &dyn MetadataResolver,
) -> Result<Option<Predicate>> {
    let mut parts = filter.property.splitn(3, '.');
    let head = parts.next().unwrap_or_default();
    let explicit_target = parts.next();
    if parts.next().is_some() {
        return Err(ContainerError::PathTooDeep(filter.property.clone()));
    }

    let property = descriptor.property(head).ok_or_else(|| {
        ContainerError::UnknownProperty {
            entity: descriptor.entity.clone(),
            property: head.to_string(),
        }
    })?;

    let target = match &property.kind {
        PropertyKind::Association { target } | PropertyKind::Collection { target } => target,
        _ => {
            if explicit_target.is_some() {
                return Err(ContainerError::Unsupported(format!(
                    "property '{head}' of entity '{}' is not an association and cannot be traversed",
                    descriptor.entity
                )));
            }
            return Ok(filter.scalar_predicate(&property.kind));
        }
    };

    let target_descriptor = resolver.descriptor(target)?;
    let target_property_name = match explicit_target {
        Some(name) => name,
        None => target_descriptor
            .filtering_property
            .as_deref()
            .ok_or_else(|| ContainerError::NoFilteringProperty(target.clone()))?,
    };
    let target_property = target_descriptor.property(target_property_name).ok_or_else(|| {
        ContainerError::UnknownProperty {
            entity: target.clone(),
            property: target_property_name.to_string(),
        }
    })?;
    if matches!(
        target_property.kind,
        PropertyKind::Association { .. } | PropertyKind::Collection { .. }
    ) {
        // The hop landed on another association; following it would be
        // a second hop.
        return Err(ContainerError::PathTooDeep(filter.property.clone()));
    }

    let mut inner_filter = filter.clone();
    inner_filter.property = target_property.name.clone();
    Ok(inner_filter
        .scalar_predicate(&target_property.kind)
        .map(|inner| Predicate::Traverse {
            property: head.to_string(),
            target: target.clone(),
            inner: Box::new(inner),
        }))
}

/// Compiles the whole filter set. Filters that contribute no predicate
/// yet are skipped; misconfigured filters abort with an error.
pub fn assemble_predicates(
    filters: &[FilterSpec],
    descriptor: &EntityDescriptor,
    resolver: &dyn MetadataResolver,
) -> Result<Vec<Predicate>> {
    let mut predicates = Vec::with_capacity(filters.len());
    for filter in filters {
        if let Some(predicate) = build_predicate(filter, descriptor, resolver)? {
            predicates.push(predicate);
        }
    }
    Ok(predicates)
}

/// Fetches one page of full records.
pub fn fetch_page(
    session: &dyn PersistenceSession,
    entity: &str,
    predicates: &[Predicate],
    order: &[SortKey],
    offset: usize,
    limit: usize,
) -> Result<Vec<Record>> {
    tracing::debug!(entity = %entity, offset, limit, "fetch page");
    session.fetch(&QuerySpec {
        entity: entity.to_string(),
        predicates: predicates.to_vec(),
        order: order.to_vec(),
        offset,
        limit: Some(limit),
    })
}

/// Fetches one page of identifiers.
pub fn fetch_ids(
    session: &dyn PersistenceSession,
    entity: &str,
    predicates: &[Predicate],
    order: &[SortKey],
    offset: usize,
    limit: usize,
) -> Result<Vec<Id>> {
    tracing::debug!(entity = %entity, offset, limit, "fetch ids");
    session.fetch_ids(&QuerySpec {
        entity: entity.to_string(),
        predicates: predicates.to_vec(),
        order: order.to_vec(),
        offset,
        limit: Some(limit),
    })
}

/// Fetches the first identifier under the given ordering, never asking
/// the store for more than one row. `first` and `last` run through
/// here, the latter with the reversed ordering.
pub fn fetch_single_capped(
    session: &dyn PersistenceSession,
    entity: &str,
    predicates: &[Predicate],
    order: &[SortKey],
) -> Result<Option<Id>> {
    let ids = fetch_ids(session, entity, predicates, order, 0, 1)?;
    Ok(ids.into_iter().next())
}
