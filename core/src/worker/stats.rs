//! Worker statistics tracking

use std::collections::BTreeMap;
use std::time::Instant;

use crate::metrics::{QueryCounters, StatsMessage};

/// Counters accumulated since the last flush
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartialStats {
    counters: BTreeMap<String, QueryCounters>,
}

impl PartialStats {
    /// Create empty partial stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted sample for `query_id`
    pub fn record(&mut self, query_id: &str, sample: QueryCounters) {
        match self.counters.get_mut(query_id) {
            Some(existing) => existing.merge(&sample),
            None => {
                self.counters.insert(query_id.to_string(), sample);
            }
        }
    }

    /// Counters for one query id
    pub fn get(&self, query_id: &str) -> Option<&QueryCounters> {
        self.counters.get(query_id)
    }

    /// Whether nothing was recorded since the last flush
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Move the accumulated counters into a message, leaving this empty
    pub fn take_message(&mut self, source_id: &str) -> StatsMessage {
        let mut message = StatsMessage::new(source_id);
        message.counters = std::mem::take(&mut self.counters);
        message
    }
}

/// Lifetime statistics kept by each worker for its own logs
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Completed passes over the schedule
    pub passes: usize,

    /// Samples accepted into partial stats
    pub samples: usize,

    /// Samples discarded (failed query or unusable counters)
    pub discarded: usize,

    /// Reconnections after a dead-connection probe
    pub reconnects: usize,

    /// Flushes performed
    pub flushes: usize,

    /// Datagrams handed to the kernel
    pub datagrams_sent: usize,

    /// Datagrams given up on after local send failures
    pub datagrams_dropped: usize,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Samples attempted (accepted + discarded)
    pub fn attempted(&self) -> usize {
        self.samples + self.discarded
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Accepted samples per second
    pub fn samples_per_second(&self) -> f64 {
        self.elapsed()
            .map(|d| {
                let secs = d.as_secs_f64();
                if secs > 0.0 {
                    self.samples as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_partial_stats_accumulates_per_query() {
        let mut partial = PartialStats::new();
        partial.record("a", QueryCounters::sample(Duration::from_millis(2), 10, 1));
        partial.record("a", QueryCounters::sample(Duration::from_millis(3), 20, 2));
        partial.record("b", QueryCounters::sample(Duration::from_millis(1), 5, 5));

        let a = partial.get("a").unwrap();
        assert_eq!(a.runs, 2);
        assert_eq!(a.run_time_us, 5_000);
        assert_eq!(a.bytes_sent, 30);
        assert_eq!(partial.get("b").unwrap().runs, 1);
    }

    #[test]
    fn test_take_message_clears() {
        let mut partial = PartialStats::new();
        partial.record("a", QueryCounters::sample(Duration::from_millis(2), 10, 1));

        let message = partial.take_message("worker-0");
        assert_eq!(message.source_id, "worker-0");
        assert_eq!(message.counters["a"].runs, 1);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_worker_stats_defaults() {
        let stats = WorkerStats::default();
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.discarded, 0);
        assert!(stats.started_at.is_none());
        assert!(stats.elapsed().is_none());
        assert_eq!(stats.samples_per_second(), 0.0);
    }

    #[test]
    fn test_worker_stats_attempted() {
        let stats = WorkerStats {
            samples: 7,
            discarded: 3,
            ..Default::default()
        };
        assert_eq!(stats.attempted(), 10);
    }

    #[test]
    fn test_worker_stats_start_stop() {
        let mut stats = WorkerStats::new();
        stats.start();
        std::thread::sleep(Duration::from_millis(10));
        stats.stop();

        let elapsed = stats.elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(10));
    }
}
