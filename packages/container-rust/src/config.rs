use std::fs;
use std::path::Path;

use crate::error::{ContainerError, Result};

/// Who owns transaction boundaries around container mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOwnership {
    /// The container commits after each successful mutation and reopens a
    /// unit of work, so every grid action is immediately durable.
    ContainerOwned,
    /// Boundaries belong entirely to the caller (a surrounding
    /// request-scoped transaction, for example); the container never
    /// commits or rolls back.
    CallerOwned,
}

/// Tunables for one container instance.
///
/// Defaults match the sizes the container was designed around: pages of
/// 100 records, a position cache of 300 identifiers, an item cache of
/// 1000 materialized views.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Records fetched per windowed query; also the page buffer size.
    pub page_size: usize,
    /// Bound of the identifier-to-index position cache. Oldest-inserted
    /// entries are evicted beyond this.
    pub position_cache_capacity: usize,
    /// Bound of the materialized item cache.
    pub item_cache_capacity: usize,
    /// Transaction-boundary convention for mutations.
    pub transaction_ownership: TransactionOwnership,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            position_cache_capacity: 300,
            item_cache_capacity: 1_000,
            transaction_ownership: TransactionOwnership::ContainerOwned,
        }
    }
}

impl ContainerConfig {
    /// Parses configuration from `key=value` properties text.
    ///
    /// Blank lines and lines starting with `#` or `!` are ignored.
    /// Unknown keys and malformed values are configuration errors;
    /// omitted keys keep their defaults.
    ///
    /// Recognized keys: `container.page_size`,
    /// `container.position_cache_capacity`,
    /// `container.item_cache_capacity`,
    /// `container.transaction_ownership` (`container` | `caller`).
    pub fn from_properties_str(text: &str) -> Result<Self> {
        let mut config = Self::default();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ContainerError::Config(format!(
                    "line {}: expected key=value, got '{line}'",
                    line_no + 1
                )));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "container.page_size" => config.page_size = parse_size(key, value)?,
                "container.position_cache_capacity" => {
                    config.position_cache_capacity = parse_size(key, value)?;
                }
                "container.item_cache_capacity" => {
                    config.item_cache_capacity = parse_size(key, value)?;
                }
                "container.transaction_ownership" => {
                    config.transaction_ownership = match value {
                        "container" => TransactionOwnership::ContainerOwned,
                        "caller" => TransactionOwnership::CallerOwned,
                        other => {
                            return Err(ContainerError::Config(format!(
                                "{key}: expected 'container' or 'caller', got '{other}'"
                            )))
                        }
                    };
                }
                other => {
                    return Err(ContainerError::Config(format!(
                        "unrecognized key '{other}'"
                    )))
                }
            }
        }

        Ok(config)
    }

    /// Loads configuration from a properties file.
    pub fn from_properties_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_properties_str(&text)
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize> {
    let parsed = value
        .parse::<usize>()
        .map_err(|_| ContainerError::Config(format!("{key}: expected a number, got '{value}'")))?;
    if parsed == 0 {
        return Err(ContainerError::Config(format!("{key}: must be positive")));
    }
    Ok(parsed)
}
