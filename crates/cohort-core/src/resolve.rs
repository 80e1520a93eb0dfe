//! Column-role resolution and date extraction shared by the operations.

use chrono::NaiveDate;
use cohort_model::{ColumnKey, ConfigError, DataQualityError, DateCell, Result, TableView};

/// Resolve an explicitly requested column, falling back to the table's
/// declared column for `role`.
pub(crate) fn resolve_role(
    table: &TableView,
    explicit: Option<&ColumnKey>,
    declared: Option<&ColumnKey>,
    role: &'static str,
) -> Result<usize> {
    match explicit.or(declared) {
        Some(key) => table.resolve_column(key),
        None => Err(ConfigError::MissingKey {
            table: table.name().to_string(),
            role,
        }
        .into()),
    }
}

/// How unparseable dates are treated while reading a date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvalidDates {
    Reject,
    Skip,
}

/// Read the date column at `position`, one entry per row.
///
/// Blank cells yield `None`. Unparseable cells either fail with
/// [`DataQualityError::UnparseableDate`] or yield `None`.
pub(crate) fn read_dates(
    table: &TableView,
    position: usize,
    invalid: InvalidDates,
) -> Result<Vec<Option<NaiveDate>>> {
    let mut dates = Vec::with_capacity(table.len());
    for (row, values) in table.rows().iter().enumerate() {
        let cell = &values[position];
        match cell.to_date() {
            DateCell::Valid(date) => dates.push(Some(date)),
            DateCell::Missing => dates.push(None),
            DateCell::Invalid => match invalid {
                InvalidDates::Skip => dates.push(None),
                InvalidDates::Reject => {
                    return Err(DataQualityError::UnparseableDate {
                        table: table.name().to_string(),
                        column: table.columns()[position].to_string(),
                        row,
                        value: cell.to_string(),
                    }
                    .into());
                }
            },
        }
    }
    Ok(dates)
}
