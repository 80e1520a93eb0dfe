//! Temporal record linkage engine.
//!
//! - [`matcher::date_proximity`] links a secondary table onto a primary one by
//!   grouping key and nearest date within a window
//! - [`reducer::group_by_keep_one`] keeps the earliest or latest row per key
//! - [`pipeline::PipelineGraph`] runs such operations across named tables in
//!   dependency order
//! - [`merger::DatasetMerger`] assembles selected fields of linked tables into
//!   one wide table
//!
//! Every operation returns a new [`cohort_model::TableView`] and appends a
//! [`cohort_model::HistoryEntry`] describing itself.

mod audit;
pub mod matcher;
pub mod merger;
pub mod pipeline;
pub mod reducer;
mod resolve;

/// Boolean column marking rows that tied with another row.
pub const DUPLICATE_MARKER_COLUMN: &str = "is_duplicate";

pub use matcher::{
    ABS_DAY_DIFFERENCE_COLUMN, DAY_DIFFERENCE_COLUMN, DEFAULT_WINDOW_DAYS, DateProximityOptions,
    DuplicatesIndicator, GetMode, MergeMode, Relation, date_proximity,
};
pub use merger::{ConsolidateOptions, DatasetMerger, FieldSelection, consolidate};
pub use pipeline::{ExecutionReport, Operation, PipelineGraph, PipelineNode, StepReport};
pub use reducer::{Keep, KeepOneOptions, group_by_keep_one};
