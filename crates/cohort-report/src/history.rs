use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment, Table};
use serde_json::{Value as JsonValue, json};

use cohort_core::ExecutionReport;
use cohort_model::TableView;

use crate::style::{align_column, new_table, optional_cell};

/// Audit log of `table`, oldest entry first.
pub fn render_history(table: &TableView) -> Table {
    let mut out = new_table(&["#", "Operation", "Parameters", "Rows in", "Rows out", "Timestamp"]);
    for index in [0, 3, 4] {
        align_column(&mut out, index, CellAlignment::Right);
    }
    for (position, entry) in table.history().iter().enumerate() {
        let parameters = entry
            .parameters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n");
        out.add_row(vec![
            Cell::new(position + 1),
            Cell::new(&entry.operation),
            optional_cell(Some(parameters.as_str())),
            Cell::new(entry.rows_before),
            Cell::new(entry.rows_after),
            Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    out
}

/// Table name, tags and history of `table` as a JSON document.
pub fn history_value(table: &TableView) -> Result<JsonValue> {
    let history = serde_json::to_value(table.history()).context("serialize history")?;
    Ok(json!({
        "table": table.name(),
        "rows": table.len(),
        "tags": table.tags(),
        "history": history,
    }))
}

/// Pretty-printed [`history_value`].
pub fn history_json(table: &TableView) -> Result<String> {
    serde_json::to_string_pretty(&history_value(table)?).context("render history json")
}

pub fn execution_json(report: &ExecutionReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("render execution report")
}
