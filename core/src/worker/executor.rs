//! Worker benchmark loop

use crate::channel::{StatsSender, MAX_DATAGRAM_SIZE};
use crate::error::{BenchError, BenchResult};
use crate::metrics::QueryCounters;
use crate::query::ParamValue;
use crate::schedule::Schedule;
use crate::traits::{
    counter_delta, DriverError, ParamSampler, Session, SessionCounters, BYTES_RECEIVED,
    BYTES_SENT,
};

use super::stats::{PartialStats, WorkerStats};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative stop request shared with a signal listener
///
/// Only consulted between queries, so an in-flight query always completes.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a flag that is not yet set
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop at its next check
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A query ready for execution: statement plus one sampler per placeholder
pub struct PreparedQuery {
    id: String,
    statement: String,
    samplers: Vec<Arc<dyn ParamSampler>>,
}

impl PreparedQuery {
    /// Create a prepared query
    pub fn new(
        id: impl Into<String>,
        statement: impl Into<String>,
        samplers: Vec<Arc<dyn ParamSampler>>,
    ) -> Self {
        Self {
            id: id.into(),
            statement: statement.into(),
            samplers,
        }
    }

    /// Query id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// SQL text
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Number of samplers (one per placeholder)
    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    fn params(&self) -> Vec<ParamValue> {
        self.samplers.iter().map(|s| s.sample()).collect()
    }
}

impl std::fmt::Debug for PreparedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("id", &self.id)
            .field("statement", &self.statement)
            .field(
                "samplers",
                &self.samplers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Worker runs its schedule in a loop: execute -> measure -> accumulate -> flush
///
/// One worker owns one database session and one stats sender. It shares no
/// memory with the supervisor; partial statistics leave the process only
/// through interval-triggered flushes.
pub struct Worker<S: Session> {
    /// Worker index
    id: usize,

    /// Stats message source id
    source_id: String,

    /// Database session (connected lazily)
    session: S,

    /// Query table; schedule entries index into it
    queries: Vec<PreparedQuery>,

    /// Execution order for one pass
    schedule: Schedule,

    /// Statistics channel
    sender: StatsSender,

    /// Minimum time between flushes
    flush_interval: Duration,

    /// Stop request
    stop: StopFlag,
}

impl<S: Session> Worker<S> {
    /// Create a new worker
    ///
    /// Use [`WorkerBuilder`](super::WorkerBuilder) for validated construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        source_id: String,
        session: S,
        queries: Vec<PreparedQuery>,
        schedule: Schedule,
        sender: StatsSender,
        flush_interval: Duration,
        stop: StopFlag,
    ) -> Self {
        Self {
            id,
            source_id,
            session,
            queries,
            schedule,
            sender,
            flush_interval,
            stop,
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Handle for requesting a stop from elsewhere
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Run the worker loop until stopped
    ///
    /// A stop abandons the rest of the current pass and does not flush the
    /// partial stats collected since the last interval flush.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::WorkerFatal`] when the session cannot be
    /// (re)established or its status probe fails. The connection is closed
    /// before returning either way.
    pub async fn run(mut self) -> BenchResult<WorkerStats> {
        let mut stats = WorkerStats::new();
        let mut partial = PartialStats::new();
        stats.start();

        tracing::debug!(
            worker_id = self.id,
            driver = self.session.driver_name(),
            schedule_len = self.schedule.len(),
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Worker started"
        );

        let result = self.benchmark_loop(&mut stats, &mut partial).await;

        self.session.disconnect().await;
        stats.stop();

        match result {
            Ok(()) => {
                tracing::debug!(
                    worker_id = self.id,
                    passes = stats.passes,
                    attempted = stats.attempted(),
                    samples = stats.samples,
                    discarded = stats.discarded,
                    samples_per_second = stats.samples_per_second(),
                    flushes = stats.flushes,
                    datagrams_dropped = stats.datagrams_dropped,
                    elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
                    "Worker finished"
                );
                Ok(stats)
            }
            Err(e) => {
                self.stop.request();
                tracing::error!(worker_id = self.id, error = %e, "Worker stopping on fatal error");
                Err(e)
            }
        }
    }

    async fn benchmark_loop(
        &mut self,
        stats: &mut WorkerStats,
        partial: &mut PartialStats,
    ) -> BenchResult<()> {
        let mut last_flush = Instant::now();

        while !self.stop.is_requested() {
            for position in 0..self.schedule.len() {
                if self.stop.is_requested() {
                    tracing::debug!(
                        worker_id = self.id,
                        position,
                        unflushed = !partial.is_empty(),
                        "Stop requested, abandoning pass"
                    );
                    return Ok(());
                }

                ensure_connection(&mut self.session, self.id, stats).await?;

                let query = &self.queries[self.schedule.entries()[position]];
                match measure(&mut self.session, query).await {
                    Some(sample) => {
                        partial.record(&query.id, sample);
                        stats.samples += 1;
                    }
                    None => stats.discarded += 1,
                }
            }

            stats.passes += 1;

            if last_flush.elapsed() >= self.flush_interval {
                self.flush(partial, stats).await;
                last_flush = Instant::now();
            }
        }

        Ok(())
    }

    /// Serialize, send and clear the partial stats
    async fn flush(&mut self, partial: &mut PartialStats, stats: &mut WorkerStats) {
        stats.flushes += 1;
        if partial.is_empty() {
            tracing::trace!(worker_id = self.id, "Nothing to flush");
            return;
        }

        let message = partial.take_message(&self.source_id);
        let datagrams = match message.into_datagrams(MAX_DATAGRAM_SIZE) {
            Ok(datagrams) => datagrams,
            Err(e) => {
                tracing::warn!(worker_id = self.id, error = %e, "Failed to encode stats");
                return;
            }
        };

        for datagram in &datagrams {
            match self.sender.send(datagram).await {
                Ok(()) => stats.datagrams_sent += 1,
                Err(e) => {
                    stats.datagrams_dropped += 1;
                    tracing::warn!(worker_id = self.id, error = %e, "Stats datagram dropped");
                }
            }
        }

        tracing::trace!(worker_id = self.id, datagrams = datagrams.len(), "Flushed stats");
    }
}

impl<S: Session> std::fmt::Debug for Worker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("source_id", &self.source_id)
            .field("driver", &self.session.driver_name())
            .field("queries", &self.queries.len())
            .field("schedule_len", &self.schedule.len())
            .field("flush_interval", &self.flush_interval)
            .finish()
    }
}

/// Make sure the session holds a live connection
///
/// Connects lazily, and reconnects exactly once when the probe reports a dead
/// connection. Any other probe failure is fatal.
async fn ensure_connection<S: Session>(
    session: &mut S,
    worker_id: usize,
    stats: &mut WorkerStats,
) -> BenchResult<()> {
    if !session.is_connected() {
        return connect(session)
            .await
            .map_err(|e| BenchError::worker_fatal(worker_id, e.to_string()));
    }

    loop {
        match session.is_alive().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                tracing::info!(worker_id, "Connection lost, reconnecting");
                session.disconnect().await;
                stats.reconnects += 1;
                return connect(session).await.map_err(|e| {
                    BenchError::worker_fatal(worker_id, format!("reconnect failed: {e}"))
                });
            }
            Err(e) if e.is_interrupted() => continue,
            Err(e) => return Err(BenchError::worker_fatal(worker_id, e.to_string())),
        }
    }
}

async fn connect<S: Session>(session: &mut S) -> Result<(), DriverError> {
    loop {
        match session.connect().await {
            Err(e) if e.is_interrupted() => continue,
            result => return result,
        }
    }
}

async fn read_counters<S: Session>(session: &mut S) -> Result<SessionCounters, DriverError> {
    loop {
        match session.session_counters().await {
            Err(e) if e.is_interrupted() => continue,
            result => return result,
        }
    }
}

async fn execute<S: Session>(
    session: &mut S,
    statement: &str,
    params: &[ParamValue],
) -> Result<Duration, DriverError> {
    loop {
        let started = Instant::now();
        match session.execute(statement, params).await {
            Ok(_rows) => return Ok(started.elapsed()),
            Err(e) if e.is_interrupted() => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Execute one query and turn it into a sample
///
/// The sample is kept only if both counter snapshots were read and none of
/// the counters went backwards.
async fn measure<S: Session>(session: &mut S, query: &PreparedQuery) -> Option<QueryCounters> {
    let params = query.params();
    let baseline = read_counters(session).await;

    let elapsed = match execute(session, &query.statement, &params).await {
        Ok(elapsed) => elapsed,
        Err(e) => {
            tracing::debug!(query_id = %query.id, error = %e, "Query failed, sample discarded");
            return None;
        }
    };

    let post = read_counters(session).await;
    let delta = match (baseline, post) {
        (Ok(baseline), Ok(post)) => counter_delta(&baseline, &post),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(query_id = %query.id, error = %e, "Session counters unavailable, sample discarded");
            return None;
        }
    };

    match delta {
        Some(delta) => Some(QueryCounters::sample(
            elapsed,
            delta.get(BYTES_SENT).copied().unwrap_or(0),
            delta.get(BYTES_RECEIVED).copied().unwrap_or(0),
        )),
        None => {
            tracing::debug!(query_id = %query.id, "Session counters went backwards, sample discarded");
            None
        }
    }
}
