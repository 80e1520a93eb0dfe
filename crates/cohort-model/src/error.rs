//! Error kinds raised by the linkage engine.
//!
//! - [`ConfigError`] - unresolvable columns, invalid options, bad field selections
//! - [`StructuralError`] - pipeline graph misuse (cycles, unknown nodes, premature access)
//! - [`DataQualityError`] - values that cannot take part in date arithmetic
//!
//! All three convert into [`LinkageError`] so `?` works across module boundaries.

use thiserror::Error;

/// Invalid configuration detected before any computation starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("column '{column}' in table '{table}' matches several columns: {candidates:?}")]
    AmbiguousColumn {
        table: String,
        column: String,
        candidates: Vec<String>,
    },

    #[error("table '{table}' has no {role} column configured")]
    MissingKey { table: String, role: &'static str },

    #[error("invalid value '{value}' for option '{option}'")]
    InvalidOption { option: &'static str, value: String },

    #[error("window must be non-negative, got {0} days")]
    NegativeWindow(i64),

    #[error("field ({origin}, {column}) selected more than once")]
    DuplicateField { origin: String, column: String },

    #[error("no table named '{0}' among the consolidation inputs")]
    UnknownOrigin(String),

    #[error("table name '{0}' used by more than one consolidation input")]
    DuplicateOrigin(String),

    #[error("table '{origin}' has more than one row for index {index}")]
    MisalignedIndex { origin: String, index: u64 },

    #[error("column '{column}' would appear twice in the output of '{table}'")]
    ColumnCollision { table: String, column: String },

    #[error("table '{table}' expects {expected} values, got {actual}")]
    RowWidth {
        table: String,
        expected: usize,
        actual: usize,
    },
}

/// Misuse of the pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("node '{0}' is not registered in the pipeline")]
    UnknownNode(String),

    #[error("node '{0}' is already registered in the pipeline")]
    DuplicateNode(String),

    #[error("edge {from}->{to} would introduce a cycle")]
    Cycle { from: String, to: String },

    #[error("edge {0}->{0} would connect a node to itself")]
    SelfLoop(String),

    #[error("pipeline has no root node")]
    NoRoot,

    #[error("pipeline has {} root nodes: {}", .roots.len(), .roots.join(", "))]
    MultipleRoots { roots: Vec<String> },

    #[error("pipeline has not been executed")]
    NotExecuted,

    #[error("edge {from}->{to} is not registered in the pipeline")]
    UnknownEdge { from: String, to: String },
}

/// A value that cannot be used where a date is required.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataQualityError {
    #[error("row {row} of table '{table}': cannot parse '{value}' in column '{column}' as a date")]
    UnparseableDate {
        table: String,
        column: String,
        row: usize,
        value: String,
    },
}

/// Top-level error returned by every fallible operation of the engine.
#[derive(Debug, Error)]
pub enum LinkageError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline error: {0}")]
    Structural(#[from] StructuralError),

    #[error("data quality error: {0}")]
    DataQuality(#[from] DataQualityError),

    /// An operation bound to a pipeline node failed during execution.
    #[error("operation on node '{node}' failed: {source}")]
    Operation {
        node: String,
        #[source]
        source: Box<LinkageError>,
    },
}

impl LinkageError {
    pub fn operation(node: impl Into<String>, source: LinkageError) -> Self {
        Self::Operation {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Innermost error, unwrapping [`LinkageError::Operation`] layers.
    pub fn root_cause(&self) -> &LinkageError {
        match self {
            Self::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkageError>;
