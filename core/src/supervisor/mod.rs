//! Supervisor for run lifecycle management
//!
//! The Supervisor coordinates a complete benchmark run:
//! - Binding the statistics channel before any worker exists
//! - Spawning one worker process per configured worker
//! - Merging the partial stats each worker flushes
//! - Stopping workers on timeout or signal, exactly once
//! - Reaping every worker before handing the totals to the reporter
//!
//! The run moves through `Init -> Running -> Stopping -> Done`. Signals and
//! child exits never touch state directly; they arrive as
//! [`SupervisorEvent`]s on the loop's own queue.
//!
//! # Example
//!
//! ```ignore
//! use sql_bench_core::supervisor::SupervisorBuilder;
//!
//! let supervisor = SupervisorBuilder::new()
//!     .config(run_config)
//!     .queries(query_set)
//!     .build()?;
//!
//! let summary = supervisor.run().await?;
//! ```

mod aggregator;
mod builder;
mod executor;
mod launcher;
mod state;

pub use aggregator::{aggregate_messages, GlobalStats, RunSummary};
pub use builder::SupervisorBuilder;
pub use executor::{StopHandle, StopReason, Supervisor, SupervisorEvent};
pub use launcher::{send_sigterm, ProcessLauncher, WorkerLauncher};
pub use state::{RunPhase, RunState};
