//! Consolidation of several linked tables into one wide table.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use cohort_model::{
    ColumnKey, ConfigError, FLATTEN_SEPARATOR, Result, StructuralError, TableView, Value,
};

use crate::audit::Audit;
use crate::pipeline::PipelineGraph;

/// One `(origin table, column)` pair to carry into the consolidated table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSelection {
    pub origin: String,
    pub column: ColumnKey,
}

impl FieldSelection {
    pub fn new(origin: impl Into<String>, column: impl Into<ColumnKey>) -> Self {
        Self {
            origin: origin.into(),
            column: column.into(),
        }
    }
}

impl From<(&str, &str)> for FieldSelection {
    fn from((origin, column): (&str, &str)) -> Self {
        Self::new(origin, column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateOptions {
    /// Join `(origin, column)` keys into single names.
    pub flatten: bool,
    pub separator: String,
    /// Name of the index column written first when flattening.
    pub index_column: String,
    /// Name of the consolidated table.
    pub name: String,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            flatten: false,
            separator: FLATTEN_SEPARATOR.to_string(),
            index_column: "_index".to_string(),
            name: "consolidated".to_string(),
        }
    }
}

impl ConsolidateOptions {
    #[must_use]
    pub fn with_flatten(mut self, enable: bool) -> Self {
        self.flatten = enable;
        self
    }

    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    #[must_use]
    pub fn with_index_column(mut self, name: impl Into<String>) -> Self {
        self.index_column = name.into();
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Builds consolidated tables with a fixed set of [`ConsolidateOptions`].
#[derive(Debug, Clone, Default)]
pub struct DatasetMerger {
    options: ConsolidateOptions,
}

impl DatasetMerger {
    pub fn new(options: ConsolidateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConsolidateOptions {
        &self.options
    }

    /// See [`consolidate`].
    pub fn consolidate(
        &self,
        primary: &TableView,
        secondaries: &[&TableView],
        fields: &[FieldSelection],
    ) -> Result<TableView> {
        consolidate(primary, secondaries, fields, &self.options)
    }

    /// Consolidate an executed pipeline: the root node's table is the primary
    /// and every other node is a secondary, in insertion order.
    pub fn consolidate_graph(&self, graph: &PipelineGraph, fields: &[FieldSelection]) -> Result<TableView> {
        if !graph.is_executed() {
            return Err(StructuralError::NotExecuted.into());
        }
        let root = graph.get_root_node()?;
        let secondaries: Vec<&TableView> = graph
            .nodes()
            .filter(|node| node.name() != root.name())
            .map(|node| node.table())
            .collect();
        consolidate(root.table(), &secondaries, fields, &self.options)
    }
}

struct Selected<'a> {
    table: &'a TableView,
    position: usize,
    rows_by_index: &'a HashMap<u64, usize>,
}

/// Assemble the selected fields of `primary` and `secondaries` into one table
/// aligned on the row index.
///
/// Rows follow the primary's index order, followed by indices only present in
/// a selected secondary. Columns follow `fields`, keyed
/// `(origin, column)` or, when flattening, by the joined name after a leading
/// index column.
///
/// # Errors
///
/// - [`ConfigError::DuplicateOrigin`] if two inputs share a name
/// - [`ConfigError::UnknownOrigin`] / [`ConfigError::UnknownColumn`] for a
///   selection naming a missing table or column
/// - [`ConfigError::DuplicateField`] if a pair is selected twice
/// - [`ConfigError::MisalignedIndex`] if an input holds several rows for one
///   index value
pub fn consolidate(
    primary: &TableView,
    secondaries: &[&TableView],
    fields: &[FieldSelection],
    options: &ConsolidateOptions,
) -> Result<TableView> {
    let span = info_span!("consolidate", primary = %primary.name(), inputs = secondaries.len() + 1);
    let _guard = span.enter();

    let inputs: Vec<&TableView> = std::iter::once(primary).chain(secondaries.iter().copied()).collect();
    let mut origins: HashMap<&str, usize> = HashMap::with_capacity(inputs.len());
    for (position, table) in inputs.iter().enumerate() {
        if origins.insert(table.name(), position).is_some() {
            return Err(ConfigError::DuplicateOrigin(table.name().to_string()).into());
        }
    }

    let mut resolved: Vec<(usize, usize)> = Vec::with_capacity(fields.len());
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        let origin = *origins
            .get(field.origin.as_str())
            .ok_or_else(|| ConfigError::UnknownOrigin(field.origin.clone()))?;
        let position = inputs[origin].resolve_column(&field.column)?;
        if !seen.insert((origin, position)) {
            return Err(ConfigError::DuplicateField {
                origin: field.origin.clone(),
                column: inputs[origin].columns()[position].to_string(),
            }
            .into());
        }
        resolved.push((origin, position));
    }

    let used: BTreeSet<usize> = std::iter::once(0).chain(resolved.iter().map(|&(origin, _)| origin)).collect();
    let mut row_maps: HashMap<usize, HashMap<u64, usize>> = HashMap::with_capacity(used.len());
    for &origin in &used {
        row_maps.insert(origin, rows_by_index(inputs[origin])?);
    }

    let mut index: Vec<u64> = Vec::new();
    let mut placed = HashSet::new();
    for &origin in &used {
        for &value in inputs[origin].index() {
            if placed.insert(value) {
                index.push(value);
            }
        }
    }
    debug!(rows = index.len(), columns = resolved.len(), "aligned inputs");

    let selected: Vec<Selected<'_>> = resolved
        .iter()
        .filter_map(|&(origin, position)| {
            row_maps.get(&origin).map(|rows_by_index| Selected {
                table: inputs[origin],
                position,
                rows_by_index,
            })
        })
        .collect();

    let mut columns: Vec<ColumnKey> = selected
        .iter()
        .map(|field| {
            ColumnKey::grouped(field.table.name(), field.table.columns()[field.position].to_string())
        })
        .collect();
    if options.flatten {
        columns = std::iter::once(ColumnKey::name(options.index_column.as_str()))
            .chain(columns.iter().map(|key| ColumnKey::name(key.flatten(&options.separator))))
            .collect();
        let mut names = HashSet::with_capacity(columns.len());
        for key in &columns {
            if !names.insert(key) {
                return Err(ConfigError::ColumnCollision {
                    table: options.name.clone(),
                    column: key.to_string(),
                }
                .into());
            }
        }
    }

    let audit = Audit::begin("consolidate", primary.len())
        .param("inputs", inputs.iter().map(|table| table.name()).collect::<Vec<_>>().join(","))
        .param("fields", resolved.len())
        .param("flatten", options.flatten);

    let mut output = TableView::new(options.name.as_str(), columns);
    for &value in &index {
        let mut row = Vec::with_capacity(output.width());
        if options.flatten {
            row.push(i64::try_from(value).map_or(Value::Null, Value::Integer));
        }
        for field in &selected {
            let cell = field
                .rows_by_index
                .get(&value)
                .map_or(Value::Null, |&source| field.table.value(source, field.position).clone());
            row.push(cell);
        }
        output.push_indexed_row(value, row)?;
    }

    output.inherit_metadata(primary);
    for table in secondaries {
        for tag in table.tags() {
            output.add_tag(tag.as_str());
        }
    }
    audit.finish(&mut output);
    info!(rows = output.len(), columns = output.width(), "consolidated tables");
    Ok(output)
}

fn rows_by_index(table: &TableView) -> Result<HashMap<u64, usize>> {
    let mut rows = HashMap::with_capacity(table.len());
    for (row, &value) in table.index().iter().enumerate() {
        if rows.insert(value, row).is_some() {
            return Err(ConfigError::MisalignedIndex {
                origin: table.name().to_string(),
                index: value,
            }
            .into());
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_origins_are_rejected() {
        let a = TableView::new("a", ["x"]);
        let b = TableView::new("a", ["y"]);
        let err = consolidate(&a, &[&b], &[], &ConsolidateOptions::default()).unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn flattened_output_starts_with_index() {
        let a = TableView::from_rows("a", ["x"], vec![vec![Value::from("1")]]).unwrap();
        let options = ConsolidateOptions::default().with_flatten(true).with_separator("_");
        let output = consolidate(&a, &[], &[FieldSelection::from(("a", "x"))], &options).unwrap();
        let names: Vec<String> = output.columns().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["_index", "a_x"]);
        assert_eq!(output.rows()[0], vec![Value::Integer(0), Value::from("1")]);
    }
}
