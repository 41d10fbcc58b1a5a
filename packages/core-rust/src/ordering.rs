//! Deterministic ordering.
//!
//! Every query orders by the caller's explicit sort keys followed by the
//! identifier as a stable tie-break, so two queries with the same filters
//! and sort always return records in the same relative order even when
//! sort columns hold duplicate values. Backward scans flip every
//! direction, tie-break included; that one flip is how `previous` and
//! `last` reuse the forward algorithms.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::metadata::EntityDescriptor;
use crate::record::Record;
use crate::types::Value;

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// The opposite direction.
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Direction of a scan over the ordered record set.
///
/// Threaded as an explicit parameter through ordering, paging, and
/// navigation. `Backward` means "run the same algorithm over the reversed
/// ordering"; nothing keys off shared mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDirection {
    /// The ordering as requested.
    Forward,
    /// The reversed ordering.
    Backward,
}

impl ScanDirection {
    /// The opposite scan direction.
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            ScanDirection::Forward => ScanDirection::Backward,
            ScanDirection::Backward => ScanDirection::Forward,
        }
    }

    /// Whether this is the forward scan.
    #[must_use]
    pub fn is_forward(self) -> bool {
        matches!(self, ScanDirection::Forward)
    }
}

/// One (property, direction) sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Property to order by.
    pub property: String,
    /// Direction for this key.
    pub direction: SortDirection,
}

impl SortKey {
    /// Creates a sort key.
    #[must_use]
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    /// The same key with its direction flipped.
    #[must_use]
    fn flipped(&self) -> Self {
        Self {
            property: self.property.clone(),
            direction: self.direction.flip(),
        }
    }
}

/// Builds the effective ordering for a query: explicit keys first, then
/// the identifier tie-break, always last.
///
/// Composite identifiers expand into their declared components, so the
/// result is a total order for every key shape. A backward scan flips
/// every direction, tie-break included. Callers validate that explicit
/// properties exist before getting here.
#[must_use]
pub fn build_order(
    explicit: &[SortKey],
    descriptor: &EntityDescriptor,
    scan: ScanDirection,
) -> Vec<SortKey> {
    let mut order: Vec<SortKey> = match scan {
        ScanDirection::Forward => explicit.to_vec(),
        ScanDirection::Backward => explicit.iter().map(SortKey::flipped).collect(),
    };

    let tie_break = match scan {
        ScanDirection::Forward => SortDirection::Asc,
        ScanDirection::Backward => SortDirection::Desc,
    };
    for id_property in descriptor.id_properties() {
        order.push(SortKey::new(id_property, tie_break));
    }

    order
}

/// Compares two records under an effective ordering.
///
/// Missing properties compare as `Null` (which sorts first). With the
/// identifier tie-break in place this never returns `Equal` for two
/// distinct persisted records.
#[must_use]
pub fn compare_records(a: &Record, b: &Record, order: &[SortKey]) -> Ordering {
    for key in order {
        let left = a.value(&key.property).unwrap_or(&Value::Null);
        let right = b.value(&key.property).unwrap_or(&Value::Null);
        let cmp = match key.direction {
            SortDirection::Asc => left.total_cmp(right),
            SortDirection::Desc => right.total_cmp(left),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}
