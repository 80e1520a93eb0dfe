//! Library side of the `cohort-link` command line.

pub mod config;
pub mod logging;
pub mod pipeline;
