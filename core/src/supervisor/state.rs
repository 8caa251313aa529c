//! Run lifecycle state owned by the supervisor loop

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Supervisor lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Channel bound, workers being spawned
    Init,
    /// Workers are running and reporting
    Running,
    /// SIGTERM sent, waiting for the remaining workers to exit
    Stopping,
    /// Every worker has been reaped
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Init => write!(f, "init"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Stopping => write!(f, "stopping"),
            RunPhase::Done => write!(f, "done"),
        }
    }
}

/// Run state: phase, timestamps, stop flag and the live worker set
///
/// Only the supervisor loop touches this, so no locking is involved.
#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    ended_at: Option<DateTime<Utc>>,
    ended: Option<Instant>,
    stop_requested: bool,
    live: Vec<u32>,
}

impl RunState {
    /// Fresh state in [`RunPhase::Init`]
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Init,
            started_at: None,
            started: None,
            ended_at: None,
            ended: None,
            stop_requested: false,
            live: Vec::new(),
        }
    }

    /// Record the start time and enter [`RunPhase::Running`]
    ///
    /// Called once every worker has been spawned. Has no effect outside
    /// [`RunPhase::Init`].
    pub fn start(&mut self) {
        if self.phase != RunPhase::Init {
            return;
        }
        self.started_at = Some(Utc::now());
        self.started = Some(Instant::now());
        self.phase = RunPhase::Running;
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Track a freshly spawned worker
    pub fn add_worker(&mut self, pid: u32) {
        self.live.push(pid);
    }

    /// Pids that have not been reaped yet
    pub fn live_workers(&self) -> &[u32] {
        &self.live
    }

    /// Forget an exited worker; returns whether it was tracked
    pub fn reap(&mut self, pid: u32) -> bool {
        let before = self.live.len();
        self.live.retain(|&live| live != pid);
        self.live.len() != before
    }

    /// Whether a stop has been requested
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Set the stop flag and enter [`RunPhase::Stopping`]
    ///
    /// Returns the pids to signal on the first call and nothing afterwards,
    /// so each live worker gets exactly one SIGTERM however many stop
    /// triggers arrive.
    pub fn request_stop(&mut self) -> Vec<u32> {
        if self.stop_requested {
            return Vec::new();
        }
        self.stop_requested = true;
        if matches!(self.phase, RunPhase::Init | RunPhase::Running) {
            self.phase = RunPhase::Stopping;
        }
        self.live.clone()
    }

    /// Whether a running run should begin stopping
    pub fn should_stop(&self, runtime: Duration) -> bool {
        self.phase == RunPhase::Running
            && (self.stop_requested || self.live.is_empty() || self.elapsed() >= runtime)
    }

    /// Enter [`RunPhase::Done`] once stopping and drained; returns whether it did
    pub fn finish_if_drained(&mut self) -> bool {
        if self.phase == RunPhase::Stopping && self.live.is_empty() {
            self.phase = RunPhase::Done;
            self.ended_at = Some(Utc::now());
            self.ended = Some(Instant::now());
            return true;
        }
        self.phase == RunPhase::Done
    }

    /// Wall-clock start
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Wall-clock end
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Time since start, frozen once done
    pub fn elapsed(&self) -> Duration {
        match (self.started, self.ended) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(pids: &[u32]) -> RunState {
        let mut state = RunState::new();
        state.start();
        for &pid in pids {
            state.add_worker(pid);
        }
        state
    }

    #[test]
    fn test_initial_state() {
        let state = RunState::new();
        assert_eq!(state.phase(), RunPhase::Init);
        assert!(!state.is_stop_requested());
        assert_eq!(state.elapsed(), Duration::ZERO);
        assert!(state.started_at().is_none());
    }

    #[test]
    fn test_workers_tracked_before_running() {
        let mut state = RunState::new();
        state.add_worker(10);
        state.add_worker(11);

        assert_eq!(state.phase(), RunPhase::Init);
        assert!(!state.should_stop(Duration::ZERO));

        state.start();
        assert_eq!(state.phase(), RunPhase::Running);
        assert_eq!(state.live_workers(), &[10, 11]);
    }

    #[test]
    fn test_stop_during_init() {
        let mut state = RunState::new();
        state.add_worker(10);

        assert_eq!(state.request_stop(), vec![10]);
        assert_eq!(state.phase(), RunPhase::Stopping);
        state.start();
        assert_eq!(state.phase(), RunPhase::Stopping);
        state.reap(10);
        assert!(state.finish_if_drained());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut state = running(&[10, 11]);

        assert_eq!(state.request_stop(), vec![10, 11]);
        assert_eq!(state.phase(), RunPhase::Stopping);
        assert!(state.request_stop().is_empty());
        assert!(state.request_stop().is_empty());
        assert_eq!(state.phase(), RunPhase::Stopping);
    }

    #[test]
    fn test_reap_during_running() {
        let mut state = running(&[10, 11]);
        assert!(state.reap(10));
        assert!(!state.reap(10));
        assert!(!state.reap(99));
        assert_eq!(state.live_workers(), &[11]);
        assert_eq!(state.phase(), RunPhase::Running);
    }

    #[test]
    fn test_empty_live_set_triggers_stop() {
        let mut state = running(&[10]);
        assert!(!state.should_stop(Duration::from_secs(60)));
        state.reap(10);
        assert!(state.should_stop(Duration::from_secs(60)));
    }

    #[test]
    fn test_runtime_triggers_stop() {
        let state = running(&[10]);
        assert!(state.should_stop(Duration::ZERO));
    }

    #[test]
    fn test_should_stop_only_while_running() {
        let mut state = running(&[10]);
        state.request_stop();
        assert!(!state.should_stop(Duration::ZERO));
    }

    #[test]
    fn test_done_requires_drained_stopping() {
        let mut state = running(&[10, 11]);
        assert!(!state.finish_if_drained());

        state.request_stop();
        state.reap(10);
        assert!(!state.finish_if_drained());

        state.reap(11);
        assert!(state.finish_if_drained());
        assert_eq!(state.phase(), RunPhase::Done);
        assert!(state.ended_at().is_some());

        let frozen = state.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(state.elapsed(), frozen);
    }
}
