//! Merging of worker stats messages into run totals

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::metrics::{QueryCounters, StatsMessage};

/// Running totals kept by the supervisor
///
/// Merging only ever adds, so the result does not depend on the order in
/// which datagrams arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalStats {
    total: QueryCounters,
    per_query: BTreeMap<String, QueryCounters>,
    messages: u64,
}

impl GlobalStats {
    /// Empty totals
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty totals with a zero bucket for every configured query id
    pub fn with_queries<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            per_query: ids
                .into_iter()
                .map(|id| (id.into(), QueryCounters::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Add every bucket of `message` into the global and per-query totals
    pub fn merge(&mut self, message: &StatsMessage) {
        for (query_id, counters) in &message.counters {
            self.total.merge(counters);
            self.per_query
                .entry(query_id.clone())
                .or_default()
                .merge(counters);
        }
        self.messages += 1;
    }

    /// Totals across all queries
    pub fn total(&self) -> &QueryCounters {
        &self.total
    }

    /// Totals per query id
    pub fn per_query(&self) -> &BTreeMap<String, QueryCounters> {
        &self.per_query
    }

    /// Totals for one query id
    pub fn query(&self, query_id: &str) -> Option<&QueryCounters> {
        self.per_query.get(query_id)
    }

    /// Number of messages merged
    pub fn messages(&self) -> u64 {
        self.messages
    }
}

/// Merge a batch of messages into fresh totals
pub fn aggregate_messages<'a>(messages: impl IntoIterator<Item = &'a StatsMessage>) -> GlobalStats {
    let mut stats = GlobalStats::new();
    for message in messages {
        stats.merge(message);
    }
    stats
}

/// Everything the reporter needs about a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Wall-clock start
    pub started_at: DateTime<Utc>,

    /// Wall-clock end
    pub ended_at: DateTime<Utc>,

    /// Monotonic run duration
    pub elapsed: Duration,

    /// Configured worker count
    pub workers: usize,

    /// Workers that exited before being asked to stop
    pub failed_workers: usize,

    /// Totals across all queries
    pub total: QueryCounters,

    /// Totals per query id
    pub per_query: BTreeMap<String, QueryCounters>,

    /// Datagrams merged
    pub messages_received: u64,

    /// Datagrams discarded as malformed
    pub messages_dropped: u64,
}

impl RunSummary {
    /// Build a summary from final totals
    pub fn new(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        elapsed: Duration,
        workers: usize,
        stats: GlobalStats,
    ) -> Self {
        Self {
            started_at,
            ended_at,
            elapsed,
            workers,
            failed_workers: 0,
            total: stats.total,
            messages_received: stats.messages,
            per_query: stats.per_query,
            messages_dropped: 0,
        }
    }

    /// Executions per second of wall time for `counters`
    pub fn runs_per_second(&self, counters: &QueryCounters) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            counters.runs as f64 / secs
        } else {
            0.0
        }
    }

    /// Global and per-query buckets, labelled, global first
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &QueryCounters)> {
        std::iter::once(("global", &self.total))
            .chain(self.per_query.iter().map(|(id, c)| (id.as_str(), c)))
    }
}
