//! Explicit history recording around table-producing operations.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Instant;

use chrono::Utc;
use cohort_model::{HistoryEntry, TableView};

/// Measures one operation and appends its [`HistoryEntry`] to the result.
pub(crate) struct Audit {
    operation: &'static str,
    parameters: BTreeMap<String, String>,
    rows_before: usize,
    started: Instant,
}

impl Audit {
    pub(crate) fn begin(operation: &'static str, rows_before: usize) -> Self {
        Self {
            operation,
            parameters: BTreeMap::new(),
            rows_before,
            started: Instant::now(),
        }
    }

    pub(crate) fn param(mut self, key: &str, value: impl Display) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn param_opt<T: Display>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub(crate) fn finish(self, table: &mut TableView) {
        let elapsed = self.started.elapsed();
        table.record(HistoryEntry {
            operation: self.operation.to_string(),
            parameters: self.parameters,
            timestamp: Utc::now(),
            rows_before: self.rows_before,
            rows_after: table.len(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
    }
}
