use serde::{Deserialize, Serialize};

/// Declared kind of a persistent property.
///
/// A closed set: predicate construction and ordering dispatch on it with
/// exhaustive matches, so adding a kind is a compile-visible change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// UTF-8 text.
    Text,
    /// Integral number (covers all integral column widths).
    Int,
    /// Floating-point decimal.
    Decimal,
    /// Boolean flag.
    Bool,
    /// Point in time.
    Date,
    /// To-one association; `target` names the referenced entity type.
    Association {
        /// Entity type the association points at.
        target: String,
    },
    /// To-many association; `target` names the referenced entity type.
    Collection {
        /// Entity type the collection elements point at.
        target: String,
    },
}

/// Single persistent property of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name as used in filter and sort paths.
    pub name: String,
    /// Declared kind, driving predicate and ordering dispatch.
    pub kind: PropertyKind,
    /// Whether this property is a component of an embedded composite key.
    pub key_component: bool,
}

impl PropertyDescriptor {
    /// Creates a non-key property.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            key_component: false,
        }
    }

    /// Marks this property as an embedded key component.
    #[must_use]
    pub fn key_component(mut self) -> Self {
        self.key_component = true;
        self
    }
}

/// Static description of one entity type: identifier shape, persistent
/// properties, and the property other entities filter on when they
/// traverse an association to this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity type name (the query namespace).
    pub entity: String,
    /// Name of the identifier property (for scalar keys). Composite keys
    /// are declared by flagging properties as key components instead.
    pub id_property: String,
    /// Property to match when another entity filters through an
    /// association to this type. `None` means such filters are a
    /// configuration error.
    pub filtering_property: Option<String>,
    /// Persistent properties in declared order.
    pub properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptor {
    /// Creates a descriptor with a scalar identifier property.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        id_property: impl Into<String>,
        properties: Vec<PropertyDescriptor>,
    ) -> Self {
        Self {
            entity: entity.into(),
            id_property: id_property.into(),
            filtering_property: None,
            properties,
        }
    }

    /// Sets the filtering property used by one-hop association filters.
    #[must_use]
    pub fn with_filtering_property(mut self, name: impl Into<String>) -> Self {
        self.filtering_property = Some(name.into());
        self
    }

    /// Looks up one property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All persistent property names, in declared order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    /// Whether the identifier is an embedded composite key.
    #[must_use]
    pub fn has_composite_id(&self) -> bool {
        self.properties.iter().any(|p| p.key_component)
    }

    /// The properties that make up the identifier, in declared order.
    ///
    /// A single element for scalar keys; the flagged key components for
    /// composite keys. The ordering tie-break appends exactly these.
    #[must_use]
    pub fn id_properties(&self) -> Vec<&str> {
        if self.has_composite_id() {
            self.properties
                .iter()
                .filter(|p| p.key_component)
                .map(|p| p.name.as_str())
                .collect()
        } else {
            vec![self.id_property.as_str()]
        }
    }

    /// Whether `name` is a component of an embedded composite key.
    #[must_use]
    pub fn is_embedded_key_component(&self, name: &str) -> bool {
        self.property(name).is_some_and(|p| p.key_component)
    }

    /// Target entity type of an association or collection property.
    #[must_use]
    pub fn association_target(&self, name: &str) -> Option<&str> {
        match self.property(name).map(|p| &p.kind) {
            Some(PropertyKind::Association { target } | PropertyKind::Collection { target }) => {
                Some(target.as_str())
            }
            _ => None,
        }
    }
}
