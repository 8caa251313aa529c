//! Report generation for benchmark results
//!
//! This crate renders a finished run's [`RunSummary`](sql_bench_core::RunSummary):
//!
//! - Human-readable text for stdout
//! - CSV, one row per bucket (global totals first, then each query)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod csv_export;
pub mod text;

pub use csv_export::CsvReport;
pub use text::TextReport;
