use std::fs;

use anyhow::{Context, Result};
use tracing::{info, info_span};

use cohort_cli::config::PipelineConfig;
use cohort_cli::pipeline::{run_pipeline, trace_rows};
use cohort_core::{DateProximityOptions, KeepOneOptions, date_proximity, group_by_keep_one};
use cohort_ingest::{LoadOptions, load_table, persist_table, to_data_frame};
use cohort_model::TableView;
use cohort_report::{execution_json, outline, render_execution, render_graph, render_history};

use crate::cli::{LinkArgs, OutputArgs, ReduceArgs, RunArgs};

pub fn run_link(args: &LinkArgs) -> Result<()> {
    let span = info_span!("link", primary = %args.primary.display(), secondary = %args.secondary.display());
    let _guard = span.enter();

    let primary = load_table(&args.primary, &LoadOptions::default())
        .with_context(|| format!("load {}", args.primary.display()))?;
    let secondary = load_table(&args.secondary, &LoadOptions::default())
        .with_context(|| format!("load {}", args.secondary.display()))?;

    let mut options = DateProximityOptions::new()
        .with_window_days(args.window)
        .with_relation(args.relation)
        .with_get_mode(args.get_mode)
        .with_merge_mode(args.merge_mode)
        .with_dropna(!args.keep_unmatched)
        .with_drop_duplicates(args.drop_duplicates);
    if let Some(key) = &args.key {
        options = options.with_grouping_key(key.as_str());
    }
    options.left_grouping_key = args.left_key.as_deref().map(Into::into);
    options.right_grouping_key = args.right_key.as_deref().map(Into::into);
    if let Some(date) = &args.date {
        options = options.with_date(date.as_str());
    }
    options.left_date = args.left_date.as_deref().map(Into::into);
    options.right_date = args.right_date.as_deref().map(Into::into);
    if let Some(column) = &args.indicator {
        options = options.with_duplicates_indicator(column.as_str());
    }
    if let Some(column) = &args.link_identifier {
        options = options.with_left_link_identifier(column.as_str());
    }

    let linked = date_proximity(&primary, &secondary, &options).context("link tables")?;
    trace_rows(&linked);
    finish(&linked, &args.output)
}

pub fn run_reduce(args: &ReduceArgs) -> Result<()> {
    let span = info_span!("reduce", input = %args.input.display());
    let _guard = span.enter();

    let table = load_table(&args.input, &LoadOptions::default())
        .with_context(|| format!("load {}", args.input.display()))?;
    let mut options = KeepOneOptions::new(args.keep)
        .with_grouping_key(args.key.as_str())
        .with_date(args.date.as_str())
        .with_drop_duplicates(args.drop_duplicates);
    if let Some(column) = &args.identifier {
        options = options.with_identifier(column.as_str());
    }

    let reduced = group_by_keep_one(&table, &options).context("reduce table")?;
    trace_rows(&reduced);
    finish(&reduced, &args.output)
}

pub fn run_config(args: &RunArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)?;
    let outcome = run_pipeline(&config)?;
    let report = outcome.graph.report().context("read execution report")?;

    println!("{}", outline(&outcome.graph));
    println!("{}", render_execution(report));
    if args.graph {
        println!("{}", render_graph(&outcome.graph));
    }
    if let Some(path) = &args.report_json {
        let json = execution_json(report)?;
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "execution report written");
    }
    if let Some(table) = &outcome.consolidated {
        print_preview(table, args.preview)?;
    }
    for path in &outcome.written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn finish(table: &TableView, output: &OutputArgs) -> Result<()> {
    print_preview(table, output.preview)?;
    if output.history {
        println!("{}", render_history(table));
    }
    if let Some(path) = &output.output {
        persist_table(table, path).with_context(|| format!("write {}", path.display()))?;
        println!("wrote {} rows to {}", table.len(), path.display());
    }
    Ok(())
}

fn print_preview(table: &TableView, rows: usize) -> Result<()> {
    if rows == 0 {
        return Ok(());
    }
    let frame = to_data_frame(table).context("build preview")?;
    println!("{}", frame.head(Some(rows)));
    Ok(())
}
