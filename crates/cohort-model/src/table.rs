#![deny(unsafe_code)]

use std::collections::BTreeSet;

use crate::column::ColumnKey;
use crate::error::{ConfigError, Result};
use crate::history::{History, HistoryEntry};
use crate::lookup::CaseInsensitiveSet;
use crate::value::Value;

/// Tag attached by operations that found tied rows.
pub const TAG_HAS_DUPLICATES: &str = "has_duplicates";

/// In-memory table of subject records.
///
/// Rows are stored positionally, aligned with `columns`. Every row also
/// carries an index value; derived tables keep the index of the row they came
/// from so several derived tables can be aligned again later.
///
/// The grouping key and date columns are resolved when they are declared, so
/// a constructed table always points at existing columns.
#[derive(Debug, Clone, Default)]
pub struct TableView {
    name: String,
    columns: Vec<ColumnKey>,
    rows: Vec<Vec<Value>>,
    index: Vec<u64>,
    identifier_column: Option<ColumnKey>,
    grouping_key_column: Option<ColumnKey>,
    date_column: Option<ColumnKey>,
    tags: BTreeSet<String>,
    history: History,
}

impl TableView {
    /// Create an empty table with the given column keys.
    pub fn new<I, K>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ColumnKey>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a table and fill it with `rows`, indexed `0..rows.len()`.
    pub fn from_rows<I, K>(name: impl Into<String>, columns: I, rows: Vec<Vec<Value>>) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<ColumnKey>,
    {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Declare the column grouping rows of the same subject.
    pub fn with_grouping_key(mut self, column: impl Into<ColumnKey>) -> Result<Self> {
        let position = self.resolve_column(&column.into())?;
        self.grouping_key_column = Some(self.columns[position].clone());
        Ok(self)
    }

    /// Declare the column holding each row's date.
    pub fn with_date_column(mut self, column: impl Into<ColumnKey>) -> Result<Self> {
        let position = self.resolve_column(&column.into())?;
        self.date_column = Some(self.columns[position].clone());
        Ok(self)
    }

    /// Declare the column uniquely identifying a row.
    pub fn with_identifier(mut self, column: impl Into<ColumnKey>) -> Result<Self> {
        let position = self.resolve_column(&column.into())?;
        self.identifier_column = Some(self.columns[position].clone());
        Ok(self)
    }

    /// Replace the row index. Must provide one value per row.
    pub fn with_index(mut self, index: Vec<u64>) -> Result<Self> {
        if index.len() != self.rows.len() {
            return Err(ConfigError::RowWidth {
                table: self.name.clone(),
                expected: self.rows.len(),
                actual: index.len(),
            }
            .into());
        }
        self.index = index;
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a row, indexed one past the current maximum index.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        let next = self.index.iter().max().map_or(0, |max| max + 1);
        self.push_indexed_row(next, row)
    }

    /// Append a row with an explicit index value.
    pub fn push_indexed_row(&mut self, index: u64, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ConfigError::RowWidth {
                table: self.name.clone(),
                expected: self.columns.len(),
                actual: row.len(),
            }
            .into());
        }
        self.rows.push(row);
        self.index.push(index);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row(&self, position: usize) -> Option<&[Value]> {
        self.rows.get(position).map(Vec::as_slice)
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn identifier_column(&self) -> Option<&ColumnKey> {
        self.identifier_column.as_ref()
    }

    pub fn grouping_key_column(&self) -> Option<&ColumnKey> {
        self.grouping_key_column.as_ref()
    }

    pub fn date_column(&self) -> Option<&ColumnKey> {
        self.date_column.as_ref()
    }

    /// Position of `key`, compared exactly.
    pub fn column_position(&self, key: &ColumnKey) -> Option<usize> {
        self.columns.iter().position(|column| column == key)
    }

    /// Position of `key`, falling back to a case-insensitive match on the
    /// flattened column name when no exact match exists.
    pub fn resolve_column(&self, key: &ColumnKey) -> Result<usize> {
        if let Some(position) = self.column_position(key) {
            return Ok(position);
        }
        let lookup = CaseInsensitiveSet::new(self.columns.iter().map(ToString::to_string));
        match lookup.positions(&key.to_string()) {
            [position] => Ok(*position),
            [] => Err(ConfigError::UnknownColumn {
                table: self.name.clone(),
                column: key.to_string(),
            }
            .into()),
            many => Err(ConfigError::AmbiguousColumn {
                table: self.name.clone(),
                column: key.to_string(),
                candidates: many.iter().map(|&pos| self.columns[pos].to_string()).collect(),
            }
            .into()),
        }
    }

    /// Value at (`row`, `column`) positions.
    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.rows[row][column]
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, key: &ColumnKey) -> Result<Vec<&Value>> {
        let position = self.resolve_column(key)?;
        Ok(self.rows.iter().map(|row| &row[position]).collect())
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Carry tags and history of `source` over to this table.
    pub fn inherit_metadata(&mut self, source: &TableView) {
        self.tags.extend(source.tags.iter().cloned());
        let mut history = source.history.clone();
        for entry in self.history.iter() {
            history.push(entry.clone());
        }
        self.history = history;
    }

    /// Reorder rows by `order`, a permutation (or selection) of row positions.
    pub fn select_rows(&self, order: &[usize]) -> TableView {
        let mut table = TableView {
            rows: Vec::with_capacity(order.len()),
            index: Vec::with_capacity(order.len()),
            ..self.clone_schema()
        };
        for &position in order {
            table.rows.push(self.rows[position].clone());
            table.index.push(self.index[position]);
        }
        table.tags = self.tags.clone();
        table.history = self.history.clone();
        table
    }

    /// Append a column filled with `values`. Must provide one value per row.
    pub fn push_column(&mut self, key: impl Into<ColumnKey>, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(ConfigError::RowWidth {
                table: self.name.clone(),
                expected: self.rows.len(),
                actual: values.len(),
            }
            .into());
        }
        self.columns.push(key.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Overwrite the column at `position` with `values`.
    pub fn replace_column(&mut self, position: usize, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(ConfigError::RowWidth {
                table: self.name.clone(),
                expected: self.rows.len(),
                actual: values.len(),
            }
            .into());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[position] = value;
        }
        Ok(())
    }

    /// Copy of the table without rows, tags or history.
    pub fn clone_schema(&self) -> TableView {
        TableView {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: Vec::new(),
            index: Vec::new(),
            identifier_column: self.identifier_column.clone(),
            grouping_key_column: self.grouping_key_column.clone(),
            date_column: self.date_column.clone(),
            tags: BTreeSet::new(),
            history: History::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visits() -> TableView {
        TableView::from_rows(
            "visits",
            ["id2", "Visit_Date"],
            vec![
                vec![Value::from("1"), Value::from("2001-01-01")],
                vec![Value::from("2"), Value::from("2001-02-01")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn resolves_columns_case_insensitively() {
        let table = visits().with_date_column("visit_date").unwrap();
        assert_eq!(table.date_column(), Some(&ColumnKey::name("Visit_Date")));
    }

    #[test]
    fn unknown_grouping_key_is_fatal() {
        let err = visits().with_grouping_key("subject").unwrap_err();
        assert!(err.to_string().contains("subject"));
    }

    #[test]
    fn ambiguous_fallback_is_rejected() {
        let table = TableView::new("t", ["Date", "DATE"]);
        let err = table.resolve_column(&ColumnKey::name("date")).unwrap_err();
        assert!(matches!(
            err,
            crate::LinkageError::Config(ConfigError::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn rows_must_match_width() {
        let mut table = TableView::new("t", ["a", "b"]);
        assert!(table.push_row(vec![Value::Null]).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn index_defaults_to_positions() {
        let table = visits();
        assert_eq!(table.index(), &[0, 1]);
        let reordered = table.select_rows(&[1, 0]);
        assert_eq!(reordered.index(), &[1, 0]);
        assert_eq!(reordered.rows()[0][0], Value::from("2"));
    }
}
