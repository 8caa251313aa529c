//! Supervisor event loop

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::channel::{endpoint_path, StatsReceiver};
use crate::config::{RunConfig, WorkerConfig};
use crate::error::{BenchError, BenchResult};
use crate::metrics::StatsMessage;
use crate::query::QueryDef;
use crate::schedule::Schedule;
use crate::signals::{SignalListener, StopSignal};

use super::aggregator::{GlobalStats, RunSummary};
use super::launcher::WorkerLauncher;
use super::state::{RunPhase, RunState};

/// Capacity of the supervisor event queue
const EVENT_BUFFER: usize = 64;

/// How long the final drain waits for one more queued datagram
const DRAIN_QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Why a run is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGTERM or SIGINT delivered to the controller
    Signal(StopSignal),
    /// [`StopHandle::stop`] was called
    External,
    /// The configured runtime elapsed
    RuntimeElapsed,
    /// Every worker exited on its own
    NoLiveWorkers,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Signal(signal) => write!(f, "received {signal}"),
            StopReason::External => write!(f, "stop requested"),
            StopReason::RuntimeElapsed => write!(f, "runtime elapsed"),
            StopReason::NoLiveWorkers => write!(f, "all workers exited"),
        }
    }
}

/// Asynchronous notifications delivered to the supervisor loop
#[derive(Debug)]
pub enum SupervisorEvent {
    /// Begin a graceful stop
    StopRequested(StopReason),
    /// A worker process terminated
    WorkerExited {
        /// Worker index
        worker_id: usize,
        /// Process id
        pid: u32,
        /// Exit status, if it could be collected
        status: Option<ExitStatus>,
    },
}

/// Requests a graceful stop of a running supervisor
#[derive(Debug, Clone)]
pub struct StopHandle {
    events: mpsc::Sender<SupervisorEvent>,
}

impl StopHandle {
    /// Request a stop; repeated calls are harmless
    ///
    /// Waits for room in the event queue, so a burst of worker exits cannot
    /// swallow the request. Returns `false` once the run has finished.
    pub async fn stop(&self) -> bool {
        match self
            .events
            .send(SupervisorEvent::StopRequested(StopReason::External))
            .await
        {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Stop requested after the run finished");
                false
            }
        }
    }
}

/// Supervisor manages the run lifecycle
///
/// Responsible for binding the statistics channel, spawning worker processes,
/// merging their reports and stopping them when the run is over.
pub struct Supervisor {
    /// Run configuration
    pub(crate) config: RunConfig,

    /// Query definitions shared by every worker
    pub(crate) queries: Vec<QueryDef>,

    /// Normalized schedule (unshuffled)
    pub(crate) schedule: Schedule,

    /// Process launcher
    pub(crate) launcher: Arc<dyn WorkerLauncher>,

    /// Whether SIGTERM/SIGINT are bridged into stop events
    pub(crate) signal_handling: bool,

    /// Event sender (cloned for signal bridge, exit watchers and stop handles)
    pub(crate) events_tx: mpsc::Sender<SupervisorEvent>,

    /// Event receiver, drained by the run loop
    pub(crate) events_rx: mpsc::Receiver<SupervisorEvent>,
}

impl Supervisor {
    /// Create a new supervisor
    ///
    /// Use `SupervisorBuilder` for a validated construction.
    pub fn new(
        config: RunConfig,
        queries: Vec<QueryDef>,
        schedule: Schedule,
        launcher: Arc<dyn WorkerLauncher>,
        signal_handling: bool,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            config,
            queries,
            schedule,
            launcher,
            signal_handling,
            events_tx,
            events_rx,
        }
    }

    /// Get a handle that can stop the run from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Get the normalized schedule
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run the benchmark
    ///
    /// Binds the statistics channel, spawns every worker, then loops over
    /// datagrams, events and a periodic tick until all workers are reaped.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::TransportInit`] when the channel cannot be bound,
    /// signal handlers cannot be installed or a worker cannot be spawned.
    /// Workers that were already running are terminated first.
    pub async fn run(self) -> BenchResult<RunSummary> {
        let Self {
            config,
            queries,
            schedule,
            launcher,
            signal_handling,
            events_tx,
            mut events_rx,
        } = self;

        let mut receiver = StatsReceiver::bind(endpoint_path(&config.endpoint_dir))?;
        let signal_bridge = if signal_handling {
            Some(spawn_signal_bridge(events_tx.clone())?)
        } else {
            None
        };

        let mut state = RunState::new();
        let mut stats = GlobalStats::with_queries(queries.iter().map(|q| q.id.clone()));
        let mut messages_dropped = 0u64;
        let mut failed_workers = 0usize;

        tracing::info!(
            workers = config.workers,
            runtime_secs = config.runtime.as_secs_f64(),
            queries = queries.len(),
            schedule_len = schedule.len(),
            endpoint = %receiver.path().display(),
            "Starting run"
        );

        let spawned = spawn_workers(
            launcher.as_ref(),
            &config,
            &queries,
            &schedule,
            receiver.path(),
            &events_tx,
            &mut state,
        )
        .await;

        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to start workers");
            stop_workers(launcher.as_ref(), &mut state, StopReason::External);
            if let Some(bridge) = signal_bridge {
                bridge.abort();
            }
            return Err(e);
        }

        // Running only once every worker exists; the runtime counts from here
        state.start();

        let mut ticker = tokio::time::interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while state.phase() != RunPhase::Done {
            tokio::select! {
                Some(event) = events_rx.recv() => match event {
                    SupervisorEvent::StopRequested(reason) => {
                        stop_workers(launcher.as_ref(), &mut state, reason);
                    }
                    SupervisorEvent::WorkerExited { worker_id, pid, status } => {
                        state.reap(pid);
                        if exited_abnormally(status, state.is_stop_requested()) {
                            failed_workers += 1;
                            tracing::warn!(worker_id, pid, status = ?status, "Worker exited abnormally");
                        } else {
                            tracing::debug!(worker_id, pid, status = ?status, "Worker exited");
                        }
                    }
                },
                received = receiver.recv() => match received {
                    Ok(bytes) => ingest(bytes, &mut stats, &mut messages_dropped),
                    Err(e) => tracing::warn!(error = %e, "Stats receive failed"),
                },
                _ = ticker.tick() => {}
            }

            if state.should_stop(config.runtime) {
                let reason = if state.live_workers().is_empty() {
                    StopReason::NoLiveWorkers
                } else {
                    StopReason::RuntimeElapsed
                };
                stop_workers(launcher.as_ref(), &mut state, reason);
            }

            state.finish_if_drained();
        }

        // Every worker is gone; whatever they sent is already queued
        loop {
            match receiver.recv_timeout(DRAIN_QUIET_PERIOD).await {
                Ok(Some(bytes)) => ingest(bytes, &mut stats, &mut messages_dropped),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Stats receive failed while draining");
                    break;
                }
            }
        }

        if let Some(bridge) = signal_bridge {
            bridge.abort();
        }

        let ended_at = state.ended_at().unwrap_or_else(chrono::Utc::now);
        let started_at = state.started_at().unwrap_or(ended_at);
        let mut summary =
            RunSummary::new(started_at, ended_at, state.elapsed(), config.workers, stats);
        summary.failed_workers = failed_workers;
        summary.messages_dropped = messages_dropped;

        tracing::info!(
            elapsed_secs = summary.elapsed.as_secs_f64(),
            runs = summary.total.runs,
            messages = summary.messages_received,
            dropped = summary.messages_dropped,
            failed_workers,
            "Run completed"
        );

        Ok(summary)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("queries", &self.queries.len())
            .field("schedule_len", &self.schedule.len())
            .field("signal_handling", &self.signal_handling)
            .finish()
    }
}

/// Forward SIGTERM/SIGINT into the event queue
fn spawn_signal_bridge(events: mpsc::Sender<SupervisorEvent>) -> BenchResult<JoinHandle<()>> {
    let mut listener = SignalListener::install()
        .map_err(|e| BenchError::transport(format!("cannot install signal handlers: {e}")))?;

    Ok(tokio::spawn(async move {
        loop {
            let signal = listener.recv().await;
            tracing::debug!(%signal, "Signal received");
            if events
                .send(SupervisorEvent::StopRequested(StopReason::Signal(signal)))
                .await
                .is_err()
            {
                break;
            }
        }
    }))
}

/// Per-worker configuration; each worker gets its own permutation when shuffling
fn worker_config(
    config: &RunConfig,
    queries: &[QueryDef],
    schedule: &Schedule,
    worker_id: usize,
    endpoint: &Path,
) -> WorkerConfig {
    let schedule = if config.shuffle {
        schedule.shuffled(&mut rand::thread_rng())
    } else {
        schedule.clone()
    };

    WorkerConfig {
        worker_id,
        queries: queries.to_vec(),
        schedule,
        db: config.db.clone(),
        endpoint: endpoint.to_path_buf(),
        flush_interval: config.flush_interval,
        send_policy: config.send_policy,
        verbose: config.verbose,
        debug: config.debug,
    }
}

async fn spawn_workers(
    launcher: &dyn WorkerLauncher,
    config: &RunConfig,
    queries: &[QueryDef],
    schedule: &Schedule,
    endpoint: &Path,
    events: &mpsc::Sender<SupervisorEvent>,
    state: &mut RunState,
) -> BenchResult<()> {
    for worker_id in 0..config.workers {
        let worker_config = worker_config(config, queries, schedule, worker_id, endpoint);
        let mut child = launcher.launch(&worker_config).await?;

        let Some(pid) = child.id() else {
            tracing::warn!(worker_id, "Worker exited before it could be tracked");
            continue;
        };
        state.add_worker(pid);

        let events = events.clone();
        tokio::spawn(async move {
            let status = child.wait().await.ok();
            let _ = events
                .send(SupervisorEvent::WorkerExited {
                    worker_id,
                    pid,
                    status,
                })
                .await;
        });

        tracing::debug!(worker_id, pid, "Worker spawned");
    }
    Ok(())
}

/// Send SIGTERM to every live worker, once per run
fn stop_workers(launcher: &dyn WorkerLauncher, state: &mut RunState, reason: StopReason) {
    if state.is_stop_requested() {
        tracing::debug!(%reason, "Stop already in progress");
        return;
    }

    let pids = state.request_stop();
    tracing::info!(%reason, workers = pids.len(), "Stopping workers");

    for pid in pids {
        if let Err(e) = launcher.terminate(pid) {
            // Nothing will report this pid's exit; stop waiting for it.
            tracing::warn!(pid, error = %e, "Failed to signal worker");
            state.reap(pid);
        }
    }
}

/// Merge one datagram, or count it as dropped
fn ingest(bytes: &[u8], stats: &mut GlobalStats, dropped: &mut u64) {
    match StatsMessage::decode(bytes) {
        Ok(message) => {
            tracing::trace!(
                source_id = %message.source_id,
                buckets = message.counters.len(),
                "Merging stats"
            );
            stats.merge(&message);
        }
        Err(e) => {
            *dropped += 1;
            tracing::debug!(error = %e, len = bytes.len(), "Dropping malformed stats datagram");
        }
    }
}

/// A worker failed if it exited non-zero, or was killed before any stop was sent
fn exited_abnormally(status: Option<ExitStatus>, stop_requested: bool) -> bool {
    match status {
        Some(status) => match status.code() {
            Some(code) => code != 0,
            None => !stop_requested,
        },
        None => true,
    }
}
