//! sql-bench-core: controller/worker machinery for weighted SQL load generation
//!
//! This crate provides the pieces every sql-bench component builds on:
//!
//! - Query definitions and the weighted schedule normalizer
//! - Core traits (Session, ParamSampler)
//! - The worker benchmark loop
//! - The one-way statistics channel between workers and the supervisor
//! - The supervisor state machine and stats aggregation
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod schedule;
pub mod signals;
pub mod supervisor;
pub mod traits;
pub mod worker;

pub use channel::{endpoint_path, SendError, StatsReceiver, StatsSender, MAX_DATAGRAM_SIZE};
pub use config::{ConfigError, DbConfig, RunConfig, SendPolicy, WorkerConfig};
pub use error::*;
pub use metrics::*;
pub use query::*;
pub use schedule::*;
pub use signals::{SignalListener, StopSignal};
pub use supervisor::{
    GlobalStats, ProcessLauncher, RunPhase, RunSummary, StopHandle, Supervisor,
    SupervisorBuilder, WorkerLauncher,
};
pub use traits::*;
pub use worker::{PreparedQuery, StopFlag, Worker, WorkerBuilder, WorkerStats};
