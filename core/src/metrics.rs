//! Per-query counters and the stats wire message

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BenchResult;
use crate::query::MAX_QUERY_ID_LEN;

/// The four metrics tracked per query
///
/// Run time is kept in whole microseconds so that merging is exactly
/// associative and commutative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryCounters {
    /// Completed executions
    pub runs: u64,
    /// Summed execution time in microseconds
    pub run_time_us: u64,
    /// Bytes sent by the server
    pub bytes_sent: u64,
    /// Bytes received by the server
    pub bytes_received: u64,
}

impl QueryCounters {
    /// Counters for a single accepted sample
    pub fn sample(elapsed: Duration, bytes_sent: u64, bytes_received: u64) -> Self {
        Self {
            runs: 1,
            run_time_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            bytes_sent,
            bytes_received,
        }
    }

    /// Add another set of counters into this one
    pub fn merge(&mut self, other: &QueryCounters) {
        self.runs = self.runs.saturating_add(other.runs);
        self.run_time_us = self.run_time_us.saturating_add(other.run_time_us);
        self.bytes_sent = self.bytes_sent.saturating_add(other.bytes_sent);
        self.bytes_received = self.bytes_received.saturating_add(other.bytes_received);
    }

    /// Summed execution time
    pub fn run_time(&self) -> Duration {
        Duration::from_micros(self.run_time_us)
    }

    /// Summed execution time in seconds
    pub fn run_time_secs(&self) -> f64 {
        self.run_time_us as f64 / 1_000_000.0
    }

    /// Mean latency in milliseconds (0 when nothing ran)
    pub fn mean_latency_ms(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.run_time_us as f64 / 1_000.0 / self.runs as f64
        }
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl std::ops::Add for QueryCounters {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.merge(&other);
        self
    }
}

/// Reasons a received datagram is discarded
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Not valid JSON for the message schema
    #[error("undecodable stats message: {0}")]
    Decode(#[from] serde_json::Error),

    /// Sender did not identify itself
    #[error("stats message has an empty source id")]
    EmptySource,

    /// A counter bucket has an empty or oversized query id
    #[error("stats message has an invalid query id ({0} bytes)")]
    InvalidQueryId(usize),
}

/// Partial statistics flushed by one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsMessage {
    /// When the flush happened
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Sending worker
    pub source_id: String,

    /// Counters per query id
    pub counters: BTreeMap<String, QueryCounters>,
}

impl StatsMessage {
    /// Create an empty message stamped now
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            source_id: source_id.into(),
            counters: BTreeMap::new(),
        }
    }

    /// Add counters for one query id
    pub fn with_counters(mut self, query_id: impl Into<String>, counters: QueryCounters) -> Self {
        self.counters
            .entry(query_id.into())
            .or_default()
            .merge(&counters);
        self
    }

    /// Serialize to the wire format
    pub fn encode(&self) -> BenchResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a datagram
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let message: StatsMessage = serde_json::from_slice(bytes)?;
        if message.source_id.is_empty() {
            return Err(MessageError::EmptySource);
        }
        if let Some(bad) = message
            .counters
            .keys()
            .find(|id| id.is_empty() || id.len() > MAX_QUERY_ID_LEN)
        {
            return Err(MessageError::InvalidQueryId(bad.len()));
        }
        Ok(message)
    }

    /// Encode into one or more datagrams of at most `max_size` bytes
    ///
    /// When the whole message does not fit, the counter map is halved until
    /// every part does. A single bucket that still does not fit is dropped
    /// and logged.
    pub fn into_datagrams(self, max_size: usize) -> BenchResult<Vec<Vec<u8>>> {
        let mut datagrams = Vec::new();
        let mut pending = vec![self];

        while let Some(message) = pending.pop() {
            let bytes = message.encode()?;
            if bytes.len() <= max_size {
                datagrams.push(bytes);
                continue;
            }

            if message.counters.len() <= 1 {
                tracing::warn!(
                    source_id = %message.source_id,
                    size = bytes.len(),
                    max_size,
                    "Stats bucket does not fit in a datagram, dropping"
                );
                continue;
            }

            let (left, right) = message.split();
            // Keep original key order in the output.
            pending.push(right);
            pending.push(left);
        }

        Ok(datagrams)
    }

    fn split(self) -> (StatsMessage, StatsMessage) {
        let mut left = self.counters;
        let middle = left.len() / 2;
        let pivot = left
            .keys()
            .nth(middle)
            .cloned()
            .unwrap_or_default();
        let right = left.split_off(&pivot);

        (
            StatsMessage {
                timestamp: self.timestamp,
                source_id: self.source_id.clone(),
                counters: left,
            },
            StatsMessage {
                timestamp: self.timestamp,
                source_id: self.source_id,
                counters: right,
            },
        )
    }
}
