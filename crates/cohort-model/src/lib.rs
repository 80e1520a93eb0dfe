//! Data model for longitudinal record linkage.
//!
//! - [`TableView`]: rows of [`Value`]s under [`ColumnKey`]s, with declared
//!   grouping key, date and identifier columns
//! - [`History`]: append-only audit trail carried by every table
//! - [`LinkageError`]: configuration, structural and data-quality failures

pub mod column;
pub mod datetime;
pub mod error;
pub mod history;
pub mod lookup;
pub mod table;
pub mod value;

pub use column::{ColumnKey, FLATTEN_SEPARATOR};
pub use error::{ConfigError, DataQualityError, LinkageError, Result, StructuralError};
pub use history::{History, HistoryEntry};
pub use lookup::CaseInsensitiveSet;
pub use table::{TAG_HAS_DUPLICATES, TableView};
pub use value::{DateCell, Value, format_numeric};
