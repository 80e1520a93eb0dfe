use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cohort_model::{DateCell, FLATTEN_SEPARATOR, TableView, Value};

use crate::error::{IngestError, Result};

/// How a CSV file becomes a [`TableView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Table name; defaults to the file stem.
    pub name: Option<String>,
    pub grouping_key: Option<String>,
    pub date: Option<String>,
    pub identifier: Option<String>,
    pub delimiter: u8,
    /// Convert parseable cells of the date column to dates.
    pub parse_dates: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            name: None,
            grouping_key: None,
            date: None,
            identifier: None,
            delimiter: b',',
            parse_dates: true,
        }
    }
}

impl LoadOptions {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_grouping_key(mut self, column: impl Into<String>) -> Self {
        self.grouping_key = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_date(mut self, column: impl Into<String>) -> Self {
        self.date = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_identifier(mut self, column: impl Into<String>) -> Self {
        self.identifier = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Read a delimited file into a table.
///
/// The first non-blank record is the header. Fully blank records are skipped,
/// short records are padded with nulls and blank cells become [`Value::Null`].
/// Every other cell is text, except that parseable cells of the declared date
/// column become [`Value::Date`].
pub fn load_table(path: &Path, options: &LoadOptions) -> Result<TableView> {
    if !path.exists() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let csv_error = |source| IngestError::CsvRead {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(options.delimiter)
        .from_path(path)
        .map_err(csv_error)?;

    let mut headers: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let cells: Vec<String> = record.iter().map(normalize_cell).collect();
        if cells.iter().all(String::is_empty) {
            skipped += 1;
            continue;
        }
        match &headers {
            None => headers = Some(record.iter().map(normalize_header).collect()),
            Some(names) => rows.push(
                (0..names.len())
                    .map(|idx| cells.get(idx).map_or(Value::Null, |cell| Value::from_raw(cell)))
                    .collect(),
            ),
        }
    }
    let Some(headers) = headers else {
        return Err(IngestError::EmptyCsv {
            path: path.to_path_buf(),
        });
    };
    debug!(path = %path.display(), columns = headers.len(), rows = rows.len(), skipped, "read csv");

    let name = options.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let mut table = TableView::from_rows(name, headers, rows)?;
    if let Some(column) = &options.grouping_key {
        table = table.with_grouping_key(column.as_str())?;
    }
    if let Some(column) = &options.identifier {
        table = table.with_identifier(column.as_str())?;
    }
    if let Some(column) = &options.date {
        table = table.with_date_column(column.as_str())?;
        if options.parse_dates {
            table = convert_dates(table)?;
        }
    }
    info!(table = %table.name(), rows = table.len(), "loaded table");
    Ok(table)
}

fn convert_dates(mut table: TableView) -> Result<TableView> {
    let Some(position) = table
        .date_column()
        .and_then(|column| table.column_position(column))
    else {
        return Ok(table);
    };
    let converted: Vec<Value> = table
        .rows()
        .iter()
        .map(|row| match row[position].to_date() {
            DateCell::Valid(date) => Value::Date(date),
            DateCell::Missing | DateCell::Invalid => row[position].clone(),
        })
        .collect();
    table.replace_column(position, converted)?;
    Ok(table)
}

/// Header names written for `table`, grouped keys joined with `.`.
pub fn flattened_headers(table: &TableView) -> Vec<String> {
    table
        .columns()
        .iter()
        .map(|key| key.flatten(FLATTEN_SEPARATOR))
        .collect()
}

/// Write `table` as CSV with a header row. Nulls are written as empty cells.
pub fn persist_table(table: &TableView, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| IngestError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_error = |source| IngestError::CsvWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new().from_path(path).map_err(csv_error)?;
    writer.write_record(flattened_headers(table)).map_err(csv_error)?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(ToString::to_string))
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|source| IngestError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!(table = %table.name(), path = %path.display(), rows = table.len(), "persisted table");
    Ok(())
}
