use std::collections::BTreeMap;
use std::fmt::Write as _;

use comfy_table::{Cell, CellAlignment, Table};

use cohort_core::{ExecutionReport, PipelineGraph};

use crate::style::{align_column, dim_cell, new_table, optional_cell};

fn join_attributes(attributes: &BTreeMap<String, String>) -> Option<String> {
    if attributes.is_empty() {
        return None;
    }
    Some(
        attributes
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Nodes of `graph` with their operation, row count and attributes.
pub fn render_nodes(graph: &PipelineGraph) -> Table {
    let mut table = new_table(&["Node", "Operation", "Rows", "Attributes"]);
    align_column(&mut table, 2, CellAlignment::Right);
    for node in graph.nodes() {
        let operation = node.operation().map(cohort_core::Operation::label);
        let attributes = join_attributes(node.attributes());
        table.add_row(vec![
            Cell::new(node.name()),
            optional_cell(operation.as_deref()),
            Cell::new(node.table().len()),
            optional_cell(attributes.as_deref()),
        ]);
    }
    table
}

/// Edges of `graph` by derived name.
pub fn render_edges(graph: &PipelineGraph) -> Table {
    let mut table = new_table(&["Edge", "Attributes"]);
    for (_, _, edge) in graph.edges() {
        let attributes = join_attributes(edge.attributes());
        table.add_row(vec![Cell::new(edge.name()), optional_cell(attributes.as_deref())]);
    }
    table
}

/// Node and edge tables of `graph`, one after the other.
pub fn render_graph(graph: &PipelineGraph) -> String {
    let mut out = render_nodes(graph).to_string();
    if graph.edge_count() > 0 {
        out.push('\n');
        out.push_str(&render_edges(graph).to_string());
    }
    out
}

/// Indented outline of `graph`: every root followed by its descendants.
///
/// ```text
/// visits
///   -> labs [date_proximity(...)]
/// ```
pub fn outline(graph: &PipelineGraph) -> String {
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (source, destination, _) in graph.edges() {
        children.entry(source).or_default().push(destination);
    }
    let mut out = String::new();
    for root in graph.root_nodes() {
        write_branch(graph, &children, root.name(), 0, &mut out);
    }
    out
}

fn write_branch(
    graph: &PipelineGraph,
    children: &BTreeMap<&str, Vec<&str>>,
    name: &str,
    depth: usize,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let arrow = if depth == 0 { "" } else { "-> " };
    let operation = graph
        .node(name)
        .ok()
        .and_then(|node| node.operation().map(cohort_core::Operation::label));
    let _ = match operation {
        Some(label) => writeln!(out, "{indent}{arrow}{name} [{label}]"),
        None => writeln!(out, "{indent}{arrow}{name}"),
    };
    for child in children.get(name).into_iter().flatten() {
        write_branch(graph, children, child, depth + 1, out);
    }
}

/// Per-node rows of an execution report, in visit order.
pub fn render_execution(report: &ExecutionReport) -> Table {
    let mut table = new_table(&["Step", "Node", "Operation", "Rows in", "Rows out", "ms"]);
    for index in [0, 3, 4, 5] {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for (step_number, step) in report.steps.iter().enumerate() {
        let elapsed = if step.operation.is_some() {
            Cell::new(step.elapsed_ms)
        } else {
            dim_cell("-")
        };
        table.add_row(vec![
            Cell::new(step_number + 1),
            Cell::new(&step.node),
            optional_cell(step.operation.as_deref()),
            Cell::new(step.rows_before),
            Cell::new(step.rows_after),
            elapsed,
        ]);
    }
    table
}
