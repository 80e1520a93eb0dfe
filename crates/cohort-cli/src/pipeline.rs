//! Execution of configured pipelines and the helpers the commands share.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, info_span, trace};

use cohort_core::{DatasetMerger, PipelineGraph};
use cohort_ingest::persist_table;
use cohort_model::TableView;

use crate::config::PipelineConfig;
use crate::logging::redact_value;

/// Graph after execution plus whatever the configuration asked to produce.
pub struct PipelineOutcome {
    pub graph: PipelineGraph,
    pub consolidated: Option<TableView>,
    /// Files written, in write order.
    pub written: Vec<PathBuf>,
}

/// Load, execute and consolidate the pipeline described by `config`.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutcome> {
    let span = info_span!("run_pipeline", tables = config.tables.len());
    let _guard = span.enter();

    let mut graph = config.build_graph()?;
    graph.execute().context("execute pipeline")?;

    let mut written = Vec::new();
    if let Some(dir) = config.output_dir() {
        written.extend(write_node_tables(&graph, &dir)?);
    }

    let consolidated = if config.fields.is_empty() {
        None
    } else {
        let merger = DatasetMerger::new(config.consolidate_options());
        let table = merger
            .consolidate_graph(&graph, &config.fields)
            .context("consolidate pipeline outputs")?;
        trace_rows(&table);
        if let Some(path) = config.output_path() {
            persist_table(&table, &path).with_context(|| format!("write {}", path.display()))?;
            written.push(path);
        }
        Some(table)
    };

    info!(
        nodes = graph.node_count(),
        files = written.len(),
        "pipeline complete"
    );
    Ok(PipelineOutcome {
        graph,
        consolidated,
        written,
    })
}

/// Write every node's table to `dir/<name>.csv`.
pub fn write_node_tables(graph: &PipelineGraph, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(graph.node_count());
    for node in graph.nodes() {
        let path = dir.join(format!("{}.csv", node.name()));
        persist_table(node.table(), &path).with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Log each row at trace level, with values redacted unless enabled.
pub fn trace_rows(table: &TableView) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    for (position, row) in table.rows().iter().enumerate() {
        let values = row
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        trace!(table = %table.name(), row = position, values = redact_value(&values), "row");
    }
}
