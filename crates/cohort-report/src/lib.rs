//! Human-readable and JSON reports for linkage pipelines.

mod graph;
mod history;
mod style;

pub use graph::{outline, render_edges, render_execution, render_graph, render_nodes};
pub use history::{execution_json, history_json, history_value, render_history};
