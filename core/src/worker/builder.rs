//! Builder pattern for Worker construction

use crate::channel::StatsSender;
use crate::error::{BenchError, BenchResult};
use crate::query::placeholder_count;
use crate::schedule::Schedule;
use crate::traits::Session;

use super::executor::{PreparedQuery, StopFlag, Worker};

use std::time::Duration;

/// Builder for creating Worker instances
///
/// Provides ergonomic construction with validation.
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .session(session)
///     .queries(prepared)
///     .schedule(schedule)
///     .sender(sender)
///     .flush_interval(Duration::from_secs(1))
///     .build()?;
/// ```
pub struct WorkerBuilder<S: Session> {
    id: usize,
    source_id: Option<String>,
    session: Option<S>,
    queries: Vec<PreparedQuery>,
    schedule: Option<Schedule>,
    sender: Option<StatsSender>,
    flush_interval: Option<Duration>,
    stop: Option<StopFlag>,
}

impl<S: Session> WorkerBuilder<S> {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            source_id: None,
            session: None,
            queries: Vec::new(),
            schedule: None,
            sender: None,
            flush_interval: None,
            stop: None,
        }
    }

    /// Override the stats source id (defaults to `worker-{id}`)
    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Set the database session
    pub fn session(mut self, session: S) -> Self {
        self.session = Some(session);
        self
    }

    /// Add one prepared query
    pub fn query(mut self, query: PreparedQuery) -> Self {
        self.queries.push(query);
        self
    }

    /// Add prepared queries in schedule index order
    pub fn queries(mut self, queries: impl IntoIterator<Item = PreparedQuery>) -> Self {
        self.queries.extend(queries);
        self
    }

    /// Set the execution schedule
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Set the statistics sender
    pub fn sender(mut self, sender: StatsSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the minimum time between flushes
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Share a stop flag (a fresh one is created otherwise)
    pub fn stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if any required field is missing, the schedule is
    /// empty or points outside the query table, or a query has the wrong
    /// number of samplers.
    pub fn build(self) -> BenchResult<Worker<S>> {
        let session = self.session.ok_or(BenchError::missing_config("session"))?;
        let schedule = self.schedule.ok_or(BenchError::missing_config("schedule"))?;
        let sender = self.sender.ok_or(BenchError::missing_config("sender"))?;
        let flush_interval = self
            .flush_interval
            .ok_or(BenchError::missing_config("flush_interval"))?;

        if self.queries.is_empty() {
            return Err(BenchError::missing_config("queries"));
        }
        schedule.validate_against(self.queries.len())?;

        for query in &self.queries {
            let expected = placeholder_count(query.statement());
            if query.sampler_count() != expected {
                return Err(BenchError::config(format!(
                    "query '{}' has {} placeholders but {} samplers",
                    query.id(),
                    expected,
                    query.sampler_count()
                )));
            }
        }

        Ok(Worker::new(
            self.id,
            self.source_id.unwrap_or_else(|| format!("worker-{}", self.id)),
            session,
            self.queries,
            schedule,
            sender,
            flush_interval,
            self.stop.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ParamValue;
    use crate::traits::{DriverError, ParamSampler, SessionCounters};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NullSession;

    #[async_trait]
    impl Session for NullSession {
        fn driver_name(&self) -> &str {
            "null"
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn connect(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        async fn disconnect(&mut self) {}

        async fn is_alive(&mut self) -> Result<bool, DriverError> {
            Ok(true)
        }

        async fn execute(&mut self, _: &str, _: &[ParamValue]) -> Result<u64, DriverError> {
            Ok(0)
        }

        async fn session_counters(&mut self) -> Result<SessionCounters, DriverError> {
            Ok(SessionCounters::new())
        }
    }

    struct Fixed;

    impl ParamSampler for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn sample(&self) -> ParamValue {
            ParamValue::Int(1)
        }
    }

    #[test]
    fn test_builder_missing_session() {
        let result = WorkerBuilder::<NullSession>::new(0)
            .query(PreparedQuery::new("q", "SELECT 1", vec![]))
            .schedule(Schedule::from_entries(vec![0]))
            .flush_interval(Duration::from_secs(1))
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("session"));
    }

    #[test]
    fn test_builder_missing_schedule() {
        let result = WorkerBuilder::new(0)
            .session(NullSession)
            .query(PreparedQuery::new("q", "SELECT 1", vec![]))
            .build();

        assert!(result.unwrap_err().to_string().contains("schedule"));
    }

    #[tokio::test]
    async fn test_builder_rejects_out_of_range_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let receiver =
            crate::channel::StatsReceiver::bind(crate::channel::endpoint_path(dir.path())).unwrap();
        let sender = StatsSender::connect(receiver.path(), Default::default()).unwrap();

        let result = WorkerBuilder::new(0)
            .session(NullSession)
            .query(PreparedQuery::new("q", "SELECT 1", vec![]))
            .schedule(Schedule::from_entries(vec![0, 1]))
            .sender(sender)
            .flush_interval(Duration::from_secs(1))
            .build();

        assert!(matches!(result, Err(BenchError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_rejects_sampler_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let receiver =
            crate::channel::StatsReceiver::bind(crate::channel::endpoint_path(dir.path())).unwrap();
        let sender = StatsSender::connect(receiver.path(), Default::default()).unwrap();

        let result = WorkerBuilder::new(0)
            .session(NullSession)
            .query(PreparedQuery::new("q", "SELECT ? + ?", vec![Arc::new(Fixed)]))
            .schedule(Schedule::from_entries(vec![0]))
            .sender(sender)
            .flush_interval(Duration::from_secs(1))
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("2 placeholders"));
    }

    #[tokio::test]
    async fn test_builder_default_source_id() {
        let dir = tempfile::tempdir().unwrap();
        let receiver =
            crate::channel::StatsReceiver::bind(crate::channel::endpoint_path(dir.path())).unwrap();
        let sender = StatsSender::connect(receiver.path(), Default::default()).unwrap();

        let worker = WorkerBuilder::new(7)
            .session(NullSession)
            .query(PreparedQuery::new("q", "SELECT ?", vec![Arc::new(Fixed)]))
            .schedule(Schedule::from_entries(vec![0]))
            .sender(sender)
            .flush_interval(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(worker.id(), 7);
        assert!(format!("{:?}", worker).contains("worker-7"));
    }
}
