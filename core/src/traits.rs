//! Core traits for database sessions and parameter samplers
//!
//! These traits are defined in core so the worker loop can be tested without
//! a server. Implementations live in their respective crates (drivers/,
//! samplers/).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::query::ParamValue;

// ============================================================================
// Database Session Trait
// ============================================================================

/// Session counter key for bytes written by the server to this connection
pub const BYTES_SENT: &str = "bytes_sent";

/// Session counter key for bytes read by the server from this connection
pub const BYTES_RECEIVED: &str = "bytes_received";

/// Connection-scoped cumulative counters, keyed by lowercase name
pub type SessionCounters = HashMap<String, u64>;

/// A single logical database connection owned by one worker
///
/// The worker drives the lifecycle: it calls [`connect`](Session::connect)
/// lazily, probes with [`is_alive`](Session::is_alive) before every query and
/// reconnects once when the probe reports a dead connection.
#[async_trait]
pub trait Session: Send {
    /// Driver identifier (e.g., "mysql")
    fn driver_name(&self) -> &str;

    /// Whether a connection is currently held
    fn is_connected(&self) -> bool;

    /// Establish the connection
    async fn connect(&mut self) -> Result<(), DriverError>;

    /// Drop the connection, ignoring errors
    async fn disconnect(&mut self);

    /// Liveness probe
    ///
    /// `Ok(false)` means the connection is gone and may be re-established.
    /// `Err` with anything but [`DriverError::Interrupted`] is unrecoverable.
    async fn is_alive(&mut self) -> Result<bool, DriverError>;

    /// Execute a statement and consume its full result set
    ///
    /// Returns the number of rows fetched.
    async fn execute(&mut self, statement: &str, params: &[ParamValue]) -> Result<u64, DriverError>;

    /// Snapshot of the session byte counters
    async fn session_counters(&mut self) -> Result<SessionCounters, DriverError>;
}

/// Database driver errors
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A system call was interrupted by signal delivery; the caller retries
    #[error("interrupted system call")]
    Interrupted,

    /// Connection could not be established
    #[error("connect failed: {0}")]
    Connect(String),

    /// Operation attempted without a connection
    #[error("not connected")]
    NotConnected,

    /// Statement execution failed
    #[error("query failed: {0}")]
    Query(String),

    /// Liveness probe failed for a reason other than a dead connection
    #[error("status probe failed: {0}")]
    Probe(String),

    /// Session counters could not be read or parsed
    #[error("session counters unavailable: {0}")]
    Counters(String),
}

impl DriverError {
    /// Whether the failed call should simply be retried
    pub fn is_interrupted(&self) -> bool {
        matches!(self, DriverError::Interrupted)
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::Interrupted {
            DriverError::Interrupted
        } else {
            DriverError::Query(err.to_string())
        }
    }
}

/// Byte-counter delta between two snapshots
///
/// Returns `None` unless every counter present in `baseline` is also present
/// in `post` with a value at least as large. A reset connection or a counter
/// wrap would otherwise produce bogus deltas.
pub fn counter_delta(baseline: &SessionCounters, post: &SessionCounters) -> Option<SessionCounters> {
    baseline
        .iter()
        .map(|(name, &before)| {
            let after = *post.get(name)?;
            after.checked_sub(before).map(|delta| (name.clone(), delta))
        })
        .collect()
}

// ============================================================================
// Parameter Sampler Trait
// ============================================================================

/// Generates the value for one statement placeholder
///
/// Samplers are shared between every schedule entry of the same query, so
/// stateful ones (sequential ranges) use interior mutability.
pub trait ParamSampler: Send + Sync {
    /// Sampler name for identification
    fn name(&self) -> &str;

    /// Produce the next value
    fn sample(&self) -> ParamValue;
}
