//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use cohort_core::{GetMode, Keep, MergeMode, Relation};

#[derive(Parser)]
#[command(
    name = "cohort-link",
    version,
    about = "Link longitudinal tables by grouping key and date proximity",
    long_about = "Link longitudinal tables by grouping key and date proximity.\n\n\
                  Attach records of a secondary table to the closest dated record of a \
                  primary table, reduce tables to one record per key, or run a whole \
                  pipeline described in a TOML file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow cell values in trace logs.
    ///
    /// Off by default because linked tables usually hold patient data.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Attach secondary records to primary records by date proximity.
    Link(LinkArgs),

    /// Keep one record per grouping key.
    Reduce(ReduceArgs),

    /// Execute a pipeline configuration.
    Run(RunArgs),
}

/// Options shared by commands that print a result table.
#[derive(Args)]
pub struct OutputArgs {
    /// Write the result to this CSV file.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Number of result rows to print (0 disables the preview).
    #[arg(long = "preview", default_value_t = 10)]
    pub preview: usize,

    /// Print the audit history of the result.
    #[arg(long = "history")]
    pub history: bool,
}

#[derive(Args)]
pub struct LinkArgs {
    /// Primary (anchor) CSV file.
    #[arg(value_name = "PRIMARY")]
    pub primary: PathBuf,

    /// Secondary CSV file linked onto the primary.
    #[arg(value_name = "SECONDARY")]
    pub secondary: PathBuf,

    /// Grouping key column present in both files.
    #[arg(long = "key", value_name = "COLUMN")]
    pub key: Option<String>,

    #[arg(long = "left-key", value_name = "COLUMN")]
    pub left_key: Option<String>,

    #[arg(long = "right-key", value_name = "COLUMN")]
    pub right_key: Option<String>,

    /// Date column present in both files.
    #[arg(long = "date", value_name = "COLUMN")]
    pub date: Option<String>,

    #[arg(long = "left-date", value_name = "COLUMN")]
    pub left_date: Option<String>,

    #[arg(long = "right-date", value_name = "COLUMN")]
    pub right_date: Option<String>,

    /// Maximum distance in days between linked records.
    #[arg(long = "window", value_name = "DAYS", default_value_t = cohort_core::DEFAULT_WINDOW_DAYS)]
    pub window: i64,

    /// Accepted direction: earlier, later or earlier_or_later.
    #[arg(long = "relation", default_value = "earlier_or_later")]
    pub relation: Relation,

    /// Candidates per anchor: closest or all.
    #[arg(long = "get", default_value = "closest")]
    pub get_mode: GetMode,

    /// partial keeps anchors only; full also appends unattached secondary rows.
    #[arg(long = "merge", default_value = "partial")]
    pub merge_mode: MergeMode,

    /// Keep primary rows that found no match.
    #[arg(long = "keep-unmatched")]
    pub keep_unmatched: bool,

    /// Keep only the first of equally close candidates.
    #[arg(long = "drop-duplicates")]
    pub drop_duplicates: bool,

    /// Add a column flagging tied matches.
    #[arg(long = "indicator", value_name = "COLUMN", num_args = 0..=1, default_missing_value = "is_duplicate")]
    pub indicator: Option<String>,

    /// Secondary column ordering tied candidates.
    #[arg(long = "link-identifier", value_name = "COLUMN")]
    pub link_identifier: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args)]
pub struct ReduceArgs {
    /// Input CSV file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(long = "key", value_name = "COLUMN")]
    pub key: String,

    #[arg(long = "date", value_name = "COLUMN")]
    pub date: String,

    /// Which row to keep: earliest, latest or all.
    #[arg(long = "keep", default_value = "earliest")]
    pub keep: Keep,

    /// Column ordering rows that share a date.
    #[arg(long = "identifier", value_name = "COLUMN")]
    pub identifier: Option<String>,

    /// Keep only the first of rows that share a date.
    #[arg(long = "drop-duplicates")]
    pub drop_duplicates: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline configuration (TOML).
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Print the node and edge tables after execution.
    #[arg(long = "graph")]
    pub graph: bool,

    /// Write the execution report as JSON.
    #[arg(long = "report-json", value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Number of consolidated rows to print (0 disables the preview).
    #[arg(long = "preview", default_value_t = 10)]
    pub preview: usize,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
