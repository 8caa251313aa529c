//! Worker module for running the benchmark loop inside a worker process
//!
//! The Worker is the execution unit of sql-bench, responsible for the simple
//! but critical loop: **execute -> measure -> accumulate -> flush -> repeat**.
//!
//! Each worker process owns exactly one database session and walks its own
//! copy of the normalized schedule. For every entry it:
//!
//! 1. Makes sure the connection is alive (connecting lazily, reconnecting once)
//! 2. Snapshots the session byte counters
//! 3. Executes the statement with freshly sampled parameters
//! 4. Snapshots the counters again and keeps the sample only if they grew
//!
//! After each complete pass, if the flush interval has elapsed, the partial
//! stats are sent to the supervisor as one or more datagrams and cleared.
//!
//! # Example
//!
//! ```ignore
//! use sql_bench_core::worker::{PreparedQuery, WorkerBuilder};
//!
//! let worker = WorkerBuilder::new(0)
//!     .session(session)
//!     .queries(prepared)
//!     .schedule(schedule)
//!     .sender(sender)
//!     .flush_interval(Duration::from_secs(1))
//!     .stop_flag(stop.clone())
//!     .build()?;
//!
//! let stats = worker.run().await?;
//! println!("Samples: {}", stats.samples);
//! ```

mod builder;
mod executor;
mod stats;

pub use builder::WorkerBuilder;
pub use executor::{PreparedQuery, StopFlag, Worker};
pub use stats::{PartialStats, WorkerStats};
