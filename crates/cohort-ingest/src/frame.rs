//! Conversion between [`TableView`] and polars `DataFrame`.

use polars::prelude::*;

use cohort_model::{FLATTEN_SEPARATOR, TableView, Value};

use crate::error::Result;

/// Converts a Polars AnyValue to a table [`Value`].
/// Integer, float and boolean cells keep their kind; everything else is text.
pub fn any_to_value(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int8(v) => Value::Integer(i64::from(v)),
        AnyValue::Int16(v) => Value::Integer(i64::from(v)),
        AnyValue::Int32(v) => Value::Integer(i64::from(v)),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt8(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt16(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt32(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt64(v) => i64::try_from(v).map_or_else(|_| Value::Float(v as f64), Value::Integer),
        AnyValue::Float32(v) => Value::Float(f64::from(v)),
        AnyValue::Float64(v) => Value::Float(v),
        AnyValue::String(s) => Value::from_raw(s),
        AnyValue::StringOwned(s) => Value::from_raw(&s),
        other => Value::from_raw(&other.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Integer,
    Float,
    Bool,
    Text,
}

fn column_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values {
        let next = match value {
            Value::Null => continue,
            Value::Integer(_) => ColumnKind::Integer,
            Value::Float(_) => ColumnKind::Float,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Text(_) | Value::Date(_) => return ColumnKind::Text,
        };
        kind = Some(match (kind, next) {
            (None, next) => next,
            (Some(ColumnKind::Integer), ColumnKind::Integer) => ColumnKind::Integer,
            (Some(ColumnKind::Bool), ColumnKind::Bool) => ColumnKind::Bool,
            (Some(ColumnKind::Integer | ColumnKind::Float), ColumnKind::Integer | ColumnKind::Float) => {
                ColumnKind::Float
            }
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

/// Build a `DataFrame` from `table`. Column names are flattened with `.`;
/// dates are written as `YYYY-MM-DD` strings.
pub fn to_data_frame(table: &TableView) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(table.width());
    for (position, key) in table.columns().iter().enumerate() {
        let name = key.flatten(FLATTEN_SEPARATOR);
        let cells = table.rows().iter().map(|row| &row[position]);
        let series = match column_kind(cells.clone()) {
            ColumnKind::Integer => Series::new(name.into(), cells.map(Value::as_i64).collect::<Vec<_>>()),
            ColumnKind::Float => Series::new(
                name.into(),
                cells
                    .map(|value| match value {
                        Value::Integer(v) => Some(*v as f64),
                        Value::Float(v) => Some(*v),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            ColumnKind::Bool => Series::new(name.into(), cells.map(Value::as_bool).collect::<Vec<_>>()),
            ColumnKind::Text => Series::new(
                name.into(),
                cells
                    .map(|value| (!value.is_null()).then(|| value.to_string()))
                    .collect::<Vec<_>>(),
            ),
        };
        columns.push(series.into_column());
    }
    Ok(DataFrame::new(columns)?)
}

/// Build a table named `name` from `df`, keeping its column order.
pub fn from_data_frame(df: &DataFrame, name: &str) -> Result<TableView> {
    let mut rows: Vec<Vec<Value>> = vec![Vec::with_capacity(df.width()); df.height()];
    let mut headers = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        headers.push(column.name().to_string());
        for (idx, row) in rows.iter_mut().enumerate() {
            row.push(any_to_value(column.get(idx).unwrap_or(AnyValue::Null)));
        }
    }
    Ok(TableView::from_rows(name, headers, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_numbers_become_floats() {
        let values = [Value::Integer(1), Value::Null, Value::Float(2.5)];
        assert!(matches!(column_kind(values.iter()), ColumnKind::Float));
        let values = [Value::Integer(1), Value::from("x")];
        assert!(matches!(column_kind(values.iter()), ColumnKind::Text));
    }

    #[test]
    fn any_values_map_to_cells() {
        assert_eq!(any_to_value(AnyValue::Int32(4)), Value::Integer(4));
        assert_eq!(any_to_value(AnyValue::String("  ")), Value::Null);
        assert_eq!(any_to_value(AnyValue::Boolean(true)), Value::Bool(true));
    }
}
