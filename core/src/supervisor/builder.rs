//! Builder pattern for Supervisor construction

use std::sync::Arc;
use std::time::Duration;

use crate::config::RunConfig;
use crate::error::{BenchError, BenchResult};
use crate::query::QuerySet;
use crate::schedule::Schedule;

use super::executor::Supervisor;
use super::launcher::{ProcessLauncher, WorkerLauncher};

/// Builder for creating a Supervisor with proper configuration
///
/// # Example
///
/// ```ignore
/// let supervisor = SupervisorBuilder::new()
///     .workers(8)
///     .runtime(Duration::from_secs(60))
///     .queries(QuerySet::load(path)?)
///     .build()?;
///
/// let summary = supervisor.run().await?;
/// ```
pub struct SupervisorBuilder {
    config: RunConfig,
    queries: Option<QuerySet>,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    signal_handling: bool,
}

impl SupervisorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            queries: None,
            launcher: None,
            signal_handling: true,
        }
    }

    /// Set the full run configuration
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the run duration
    pub fn runtime(mut self, runtime: Duration) -> Self {
        self.config.runtime = runtime;
        self
    }

    /// Set the query definitions
    pub fn queries(mut self, queries: QuerySet) -> Self {
        self.queries = Some(queries);
        self
    }

    /// Set the worker launcher (defaults to re-executing the current binary)
    pub fn launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Bridge SIGTERM/SIGINT into graceful stops (on by default)
    pub fn signal_handling(mut self, enabled: bool) -> Self {
        self.signal_handling = enabled;
        self
    }

    /// Build the supervisor
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the queries are not set, the run
    /// configuration is invalid or the weights cannot be normalized.
    pub fn build(self) -> BenchResult<Supervisor> {
        let queries = self
            .queries
            .ok_or_else(|| BenchError::missing_config("queries"))?;

        self.config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;

        let schedule = Schedule::normalize(queries.queries(), self.config.max_schedule_size)?;

        let launcher = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ProcessLauncher::current_exe()?),
        };

        tracing::debug!(
            queries = queries.len(),
            schedule_len = schedule.len(),
            "Schedule normalized"
        );

        Ok(Supervisor::new(
            self.config,
            queries.into_queries(),
            schedule,
            launcher,
            self.signal_handling,
        ))
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
