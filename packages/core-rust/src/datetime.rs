//! Filter-bound date parsing.
//!
//! Filter boxes accept progressively longer prefixes of one canonical
//! pattern, `yyyy-MM-dd HH:mm`: typing `2024` means the start of 2024,
//! `2024-03` the start of March, and so on. Parsing overlays the input
//! onto a template carrying the missing lower-order fields, then parses
//! the completed string strictly. Anything that does not parse is the
//! caller's cue to reject all rows rather than fail.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Canonical bound pattern in `chrono` syntax.
const BOUND_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Template supplying default lower-order fields for short inputs.
const BOUND_TEMPLATE: &str = "1970-01-01 00:00";

/// Minimum representable instant; the default lower bound of a date range
/// whose "from" box is empty.
#[must_use]
pub fn min_bound() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// Sentinel maximum, 9999-12-31; the default upper bound of a date range
/// whose "to" box is empty.
#[must_use]
pub fn max_bound() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(DateTime::<Utc>::MAX_UTC, |n| n.and_utc())
}

/// Parses one range bound typed into a filter box.
///
/// Returns `None` for empty input (caller substitutes the default bound)
/// and for anything unparsable (caller degrades to a reject-all
/// predicate). Inputs longer than the pattern are cut to it.
#[must_use]
pub fn parse_bound(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() || !input.is_ascii() {
        return None;
    }

    let take = input.len().min(BOUND_TEMPLATE.len());
    let mut completed = String::with_capacity(BOUND_TEMPLATE.len());
    completed.push_str(&input[..take]);
    completed.push_str(&BOUND_TEMPLATE[take..]);

    NaiveDateTime::parse_from_str(&completed, BOUND_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}
