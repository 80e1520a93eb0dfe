//! Table ingestion for the linkage engine.
//!
//! [`load_table`] and [`persist_table`] move tables between CSV files and
//! [`cohort_model::TableView`]; [`to_data_frame`] and [`from_data_frame`]
//! bridge to polars.

pub mod csv_table;
pub mod error;
pub mod frame;

pub use csv_table::{LoadOptions, flattened_headers, load_table, persist_table};
pub use error::{IngestError, Result};
pub use frame::{any_to_value, from_data_frame, to_data_frame};
