use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Identifier of a persistent record.
///
/// Either a single scalar or a composite of scalars in the entity's
/// declared key-component order. The derived `Ord` gives every identifier
/// kind a total order, which the ordering tie-break relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Id {
    /// Numeric identifier (signed 64-bit).
    Int(i64),
    /// Textual identifier (UTF-8).
    Text(String),
    /// Embedded composite key, components in declared order.
    Composite(Vec<Id>),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(n) => write!(f, "{n}"),
            Id::Text(s) => write!(f, "{s}"),
            Id::Composite(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ":")?;
                    }
                    write!(f, "{part}")?;
                }
                Ok(())
            }
        }
    }
}

/// Runtime value of one persistent property.
///
/// Association properties never hold the referenced record itself: a
/// to-one association holds the referenced identifier (`Ref`), a to-many
/// association holds the set of referenced identifiers (`RefSet`). This
/// keeps grid display uniform and avoids eager loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer (signed 64-bit; covers the smaller integral column types).
    Int(i64),
    /// Floating-point decimal (64-bit IEEE 754).
    Decimal(f64),
    /// Text (UTF-8).
    Text(String),
    /// Point in time, UTC.
    Date(DateTime<Utc>),
    /// To-one association: identifier of the referenced record.
    Ref(Id),
    /// To-many association: identifiers of the referenced records.
    /// Uses `BTreeSet` for deterministic iteration order.
    RefSet(BTreeSet<Id>),
}

impl Value {
    /// Total order over values, used by the ordering comparator.
    ///
    /// `Null` sorts before everything. Values of different variants order
    /// by variant rank, which only matters for malformed data; a validated
    /// record set compares like with like. Decimals compare through
    /// [`OrderedFloat`], so NaN cannot produce an inconsistent sort.
    #[must_use]
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Ref(a), Value::Ref(b)) => a.cmp(b),
            (Value::RefSet(a), Value::RefSet(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Converts a scalar value into an identifier, when it can be one.
    ///
    /// Identifier properties hold `Int` or `Text`; everything else
    /// (including associations) is not a legal identifier component.
    #[must_use]
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Value::Int(n) => Some(Id::Int(*n)),
            Value::Text(s) => Some(Id::Text(s.clone())),
            _ => None,
        }
    }

    /// Variant rank for cross-variant comparisons (`Null` lowest).
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Decimal(_) => 3,
            Value::Text(_) => 4,
            Value::Date(_) => 5,
            Value::Ref(_) => 6,
            Value::RefSet(_) => 7,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M")),
            Value::Ref(id) => write!(f, "{id}"),
            Value::RefSet(ids) => {
                write!(f, "{{")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
