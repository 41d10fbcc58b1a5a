//! Filters and the predicates they compile into.
//!
//! A [`FilterSpec`] is what a user typed: a property path, one or two
//! filter strings, and match flags. Predicate construction dispatches on
//! the property's declared kind and is deliberately forgiving about user
//! input: a malformed number produces *no* predicate (the filter is "not
//! yet valid"), while an unrecognized boolean token or unparsable date
//! produces a predicate that matches nothing. Bad keystrokes in a filter
//! box must never take down the view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::datetime;
use crate::metadata::PropertyKind;
use crate::types::{Id, Value};

/// How a text predicate matches within the property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMatchMode {
    /// Match anywhere in the value.
    Anywhere,
    /// Match at the start of the value only.
    Prefix,
}

/// One filter as entered by the caller. Immutable value object; the
/// filter set dedupes by full equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Target property path: a plain property, a bare association
    /// property, or `association.property` (one hop at most).
    pub property: String,
    /// The filter string (lower bound, for ranges).
    pub value: String,
    /// Optional upper bound for range filters.
    pub second_value: Option<String>,
    /// Case-insensitive matching for text filters.
    pub ignore_case: bool,
    /// Prefix-only matching for text filters.
    pub prefix_only: bool,
}

impl FilterSpec {
    /// Creates a filter.
    #[must_use]
    pub fn new(
        property: impl Into<String>,
        value: impl Into<String>,
        ignore_case: bool,
        prefix_only: bool,
    ) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            second_value: None,
            ignore_case,
            prefix_only,
        }
    }

    /// Adds a range upper bound (date filters).
    #[must_use]
    pub fn with_upper_bound(mut self, value: impl Into<String>) -> Self {
        self.second_value = Some(value.into());
        self
    }

    /// Compiles this filter against a scalar property kind.
    ///
    /// Returns `None` when the input cannot produce a predicate yet
    /// (malformed numeric input leaves the set unfiltered). Association
    /// kinds are assembled into [`Predicate::Traverse`] by the query
    /// planner before scalar dispatch; reaching them here yields
    /// [`Predicate::RejectAll`] so a planner bug can never widen a result
    /// set.
    #[must_use]
    pub fn scalar_predicate(&self, kind: &PropertyKind) -> Option<Predicate> {
        match kind {
            PropertyKind::Text => Some(Predicate::TextMatches {
                property: self.property.clone(),
                needle: self.value.clone(),
                mode: if self.prefix_only {
                    TextMatchMode::Prefix
                } else {
                    TextMatchMode::Anywhere
                },
                fold_case: self.ignore_case,
            }),
            PropertyKind::Int => match self.value.parse::<i64>() {
                Ok(expected) => Some(Predicate::IntEquals {
                    property: self.property.clone(),
                    expected,
                }),
                Err(_) => None,
            },
            PropertyKind::Decimal => match self.value.parse::<f64>() {
                Ok(expected) => Some(Predicate::DecimalEquals {
                    property: self.property.clone(),
                    expected,
                }),
                Err(_) => None,
            },
            PropertyKind::Bool => Some(self.bool_predicate()),
            PropertyKind::Date => Some(self.date_predicate()),
            PropertyKind::Association { .. } | PropertyKind::Collection { .. } => {
                Some(Predicate::RejectAll)
            }
        }
    }

    /// Boolean token heuristics: yes/y/1 and no/n/0, ASCII
    /// case-insensitive. Anything else matches zero rows.
    fn bool_predicate(&self) -> Predicate {
        let token = self.value.as_str();
        let expected = if token.eq_ignore_ascii_case("yes")
            || token.eq_ignore_ascii_case("y")
            || token == "1"
        {
            Some(true)
        } else if token.eq_ignore_ascii_case("no")
            || token.eq_ignore_ascii_case("n")
            || token == "0"
        {
            Some(false)
        } else {
            None
        };

        match expected {
            Some(expected) => Predicate::BoolEquals {
                property: self.property.clone(),
                expected,
            },
            None => Predicate::RejectAll,
        }
    }

    /// Inclusive date range. Empty bounds fall back to the minimum
    /// instant and the 9999-12-31 sentinel; an unparsable bound rejects
    /// all rows rather than erroring past the caller.
    fn date_predicate(&self) -> Predicate {
        let from = if self.value.trim().is_empty() {
            Some(datetime::min_bound())
        } else {
            datetime::parse_bound(&self.value)
        };
        let to = match &self.second_value {
            None => Some(datetime::max_bound()),
            Some(s) if s.trim().is_empty() => Some(datetime::max_bound()),
            Some(s) => datetime::parse_bound(s),
        };

        match (from, to) {
            (Some(from), Some(to)) => Predicate::DateBetween {
                property: self.property.clone(),
                from,
                to,
            },
            _ => Predicate::RejectAll,
        }
    }
}

/// A compiled row predicate. Closed set: every consumer matches
/// exhaustively, so unsupported shapes cannot slip through dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Substring or prefix match on a text property.
    TextMatches {
        /// Target property.
        property: String,
        /// Text to look for.
        needle: String,
        /// Anywhere or prefix-only.
        mode: TextMatchMode,
        /// Case-insensitive when set.
        fold_case: bool,
    },
    /// Exact integer equality.
    IntEquals {
        /// Target property.
        property: String,
        /// Parsed expected value.
        expected: i64,
    },
    /// Exact decimal equality (compared through a total float order).
    DecimalEquals {
        /// Target property.
        property: String,
        /// Parsed expected value.
        expected: f64,
    },
    /// Boolean equality.
    BoolEquals {
        /// Target property.
        property: String,
        /// Expected flag.
        expected: bool,
    },
    /// Inclusive date range.
    DateBetween {
        /// Target property.
        property: String,
        /// Lower bound, inclusive.
        from: DateTime<Utc>,
        /// Upper bound, inclusive.
        to: DateTime<Utc>,
    },
    /// One-hop association traversal: the referenced record of `target`
    /// type must satisfy `inner`. A to-many property matches when any
    /// element does.
    Traverse {
        /// Association property on the filtered entity.
        property: String,
        /// Referenced entity type.
        target: String,
        /// Predicate applied to the referenced record.
        inner: Box<Predicate>,
    },
    /// Matches no row. The degradation target for unparsable input.
    RejectAll,
}

/// Resolves a referenced record's property values during in-memory
/// evaluation of [`Predicate::Traverse`].
pub type AssociationLookup<'a> = &'a dyn Fn(&str, &Id) -> Option<BTreeMap<String, Value>>;

impl Predicate {
    /// Evaluates this predicate against one record's property values.
    ///
    /// Type-mismatched or missing values never match; a filter narrows,
    /// it cannot widen.
    #[must_use]
    pub fn matches(&self, values: &BTreeMap<String, Value>, lookup: AssociationLookup<'_>) -> bool {
        match self {
            Predicate::TextMatches {
                property,
                needle,
                mode,
                fold_case,
            } => match values.get(property) {
                Some(Value::Text(text)) => {
                    if *fold_case {
                        let haystack = text.to_lowercase();
                        let needle = needle.to_lowercase();
                        match mode {
                            TextMatchMode::Anywhere => haystack.contains(&needle),
                            TextMatchMode::Prefix => haystack.starts_with(&needle),
                        }
                    } else {
                        match mode {
                            TextMatchMode::Anywhere => text.contains(needle.as_str()),
                            TextMatchMode::Prefix => text.starts_with(needle.as_str()),
                        }
                    }
                }
                _ => false,
            },
            Predicate::IntEquals { property, expected } => {
                matches!(values.get(property), Some(Value::Int(n)) if n == expected)
            }
            Predicate::DecimalEquals { property, expected } => match values.get(property) {
                Some(Value::Decimal(d)) => OrderedFloat(*d) == OrderedFloat(*expected),
                _ => false,
            },
            Predicate::BoolEquals { property, expected } => {
                matches!(values.get(property), Some(Value::Bool(b)) if b == expected)
            }
            Predicate::DateBetween { property, from, to } => match values.get(property) {
                Some(Value::Date(d)) => from <= d && d <= to,
                _ => false,
            },
            Predicate::Traverse {
                property,
                target,
                inner,
            } => match values.get(property) {
                Some(Value::Ref(id)) => lookup(target, id)
                    .is_some_and(|referenced| inner.matches(&referenced, lookup)),
                Some(Value::RefSet(ids)) => ids.iter().any(|id| {
                    lookup(target, id)
                        .is_some_and(|referenced| inner.matches(&referenced, lookup))
                }),
                _ => false,
            },
            Predicate::RejectAll => false,
        }
    }
}

/// Conjunction over a predicate list; an empty list matches everything.
#[must_use]
pub fn matches_all(
    predicates: &[Predicate],
    values: &BTreeMap<String, Value>,
    lookup: AssociationLookup<'_>,
) -> bool {
    predicates.iter().all(|p| p.matches(values, lookup))
}
