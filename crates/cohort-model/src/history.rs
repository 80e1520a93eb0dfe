//! Append-only audit trail attached to every table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One operation applied to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub operation: String,
    pub parameters: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub rows_before: usize,
    pub rows_after: usize,
    pub elapsed_ms: u64,
}

impl HistoryEntry {
    pub fn new(operation: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        Self {
            operation: operation.into(),
            parameters,
            timestamp: Utc::now(),
            rows_before: 0,
            rows_after: 0,
            elapsed_ms: 0,
        }
    }
}

/// Ordered log of [`HistoryEntry`] records. Entries can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
