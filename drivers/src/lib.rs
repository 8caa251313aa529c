//! sql-bench-drivers: Database session implementations
//!
//! Each driver implements [`sql_bench_core::Session`] for one database.
//! Currently supported:
//!
//! - **MySQL** (and wire-compatible servers): [`MySqlSession`], built on `sqlx`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mysql;

pub use mysql::MySqlSession;
