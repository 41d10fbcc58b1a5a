use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::metadata::EntityDescriptor;
use crate::types::{Id, Value};

/// One persistent record: property values plus the version counter used
/// for optimistic-lock conflict detection.
///
/// The record itself is plain data; which entity type it belongs to is
/// context the caller carries (queries and sessions are entity-scoped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Property values by name. `BTreeMap` for deterministic serialization.
    pub values: BTreeMap<String, Value>,
    /// Version at load time; a store bumps it on every successful update
    /// and rejects writes carrying a stale version.
    pub version: u64,
}

impl Record {
    /// Creates an empty record at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            version: 0,
        }
    }

    /// Creates a record from property values, at version 0.
    #[must_use]
    pub fn with_values(values: BTreeMap<String, Value>) -> Self {
        Self { values, version: 0 }
    }

    /// Creates a blank record with every declared property set to `Null`,
    /// the shape `add_new` persists before the user fills in fields.
    #[must_use]
    pub fn blank(descriptor: &EntityDescriptor) -> Self {
        let values = descriptor
            .property_names()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        Self { values, version: 0 }
    }

    /// Reads one property value.
    #[must_use]
    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Writes one property value.
    pub fn set_value(&mut self, property: impl Into<String>, value: Value) {
        self.values.insert(property.into(), value);
    }

    /// Extracts the record's identifier per the descriptor's key shape.
    ///
    /// Scalar keys read the identifier property; composite keys collect
    /// the flagged components in declared order. Returns `None` when any
    /// required component is missing or not an identifier-capable scalar
    /// (a record not yet persisted, or malformed data).
    #[must_use]
    pub fn id(&self, descriptor: &EntityDescriptor) -> Option<Id> {
        let id_properties = descriptor.id_properties();
        if id_properties.len() == 1 {
            self.value(id_properties[0]).and_then(Value::as_id)
        } else {
            let components: Option<Vec<Id>> = id_properties
                .iter()
                .map(|name| self.value(name).and_then(Value::as_id))
                .collect();
            components.map(Id::Composite)
        }
    }

    /// Formats the record for audit trails: `[prop=value], [prop=value]`
    /// over the declared properties in order.
    #[must_use]
    pub fn detail_string(&self, descriptor: &EntityDescriptor) -> String {
        let mut details = String::new();
        for (i, name) in descriptor.property_names().enumerate() {
            if i > 0 {
                details.push_str(", ");
            }
            let value = self.value(name).unwrap_or(&Value::Null);
            let _ = write!(details, "[{name}={value}]");
        }
        details
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyDescriptor, PropertyKind};

    fn person() -> EntityDescriptor {
        EntityDescriptor::new(
            "Person",
            "id",
            vec![
                PropertyDescriptor::new("id", PropertyKind::Int),
                PropertyDescriptor::new("name", PropertyKind::Text),
            ],
        )
    }

    fn order_line() -> EntityDescriptor {
        EntityDescriptor::new(
            "OrderLine",
            "id",
            vec![
                PropertyDescriptor::new("order_no", PropertyKind::Int).key_component(),
                PropertyDescriptor::new("line_no", PropertyKind::Int).key_component(),
            ],
        )
    }

    #[test]
    fn scalar_id_extraction() {
        let mut record = Record::new();
        record.set_value("id", Value::Int(7));
        record.set_value("name", Value::Text("Anna".into()));
        assert_eq!(record.id(&person()), Some(Id::Int(7)));
    }

    #[test]
    fn composite_id_extraction_in_component_order() {
        let mut record = Record::new();
        record.set_value("line_no", Value::Int(2));
        record.set_value("order_no", Value::Int(100));
        assert_eq!(
            record.id(&order_line()),
            Some(Id::Composite(vec![Id::Int(100), Id::Int(2)]))
        );
    }

    #[test]
    fn id_missing_when_unset() {
        let record = Record::new();
        assert_eq!(record.id(&person()), None);

        let mut partial = Record::new();
        partial.set_value("order_no", Value::Int(1));
        assert_eq!(partial.id(&order_line()), None);
    }

    #[test]
    fn blank_record_has_all_properties_null() {
        let record = Record::blank(&person());
        assert_eq!(record.value("id"), Some(&Value::Null));
        assert_eq!(record.value("name"), Some(&Value::Null));
        assert_eq!(record.version, 0);
    }

    #[test]
    fn detail_string_format() {
        let mut record = Record::new();
        record.set_value("id", Value::Int(3));
        record.set_value("name", Value::Text("Ivan".into()));
        assert_eq!(record.detail_string(&person()), "[id=3], [name=Ivan]");
    }

    #[test]
    fn record_serde_roundtrip() {
        let mut record = Record::new();
        record.set_value("id", Value::Int(1));
        record.version = 4;
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
