use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when a grouped column key is flattened to a single name.
pub const FLATTEN_SEPARATOR: &str = ".";

/// Key of a table column.
///
/// Consolidated tables use two-level keys, `(origin table, column name)`,
/// so the same column name may appear once per origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnKey {
    Name(String),
    Grouped(String, String),
}

impl ColumnKey {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn grouped(origin: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Grouped(origin.into(), name.into())
    }

    /// The innermost column name.
    pub fn leaf(&self) -> &str {
        match self {
            Self::Name(name) | Self::Grouped(_, name) => name,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Grouped(origin, _) => Some(origin),
        }
    }

    /// Join the levels of the key with `separator`.
    pub fn flatten(&self, separator: &str) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Grouped(origin, name) => format!("{origin}{separator}{name}"),
        }
    }

    /// Append `suffix` to the innermost name.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        match self {
            Self::Name(name) => Self::Name(format!("{name}{suffix}")),
            Self::Grouped(origin, name) => Self::Grouped(origin.clone(), format!("{name}{suffix}")),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten(FLATTEN_SEPARATOR))
    }
}

impl From<&str> for ColumnKey {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<&String> for ColumnKey {
    fn from(value: &String) -> Self {
        Self::Name(value.clone())
    }
}

impl From<(&str, &str)> for ColumnKey {
    fn from((origin, name): (&str, &str)) -> Self {
        Self::Grouped(origin.to_string(), name.to_string())
    }
}

impl From<&ColumnKey> for ColumnKey {
    fn from(value: &ColumnKey) -> Self {
        value.clone()
    }
}
