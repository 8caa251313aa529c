//! Error types for sql-bench-core

use thiserror::Error;

/// Core error type
///
/// Only the fatal kinds live here. Per-sample failures are
/// [`DriverError`](crate::traits::DriverError)s that the worker loop absorbs,
/// and undecodable datagrams are [`MessageError`](crate::metrics::MessageError)s
/// that the supervisor drops.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid or missing configuration; raised before any worker is spawned
    #[error("configuration error: {0}")]
    Config(String),

    /// The statistics channel could not be created or a worker could not be spawned
    #[error("transport initialization failed: {0}")]
    TransportInit(String),

    /// A worker cannot continue (no database connection, failed status probe)
    #[error("worker {worker_id} failed: {message}")]
    WorkerFatal {
        /// Worker that gave up
        worker_id: usize,
        /// Cause
        message: String,
    },

    /// Stats message could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Configuration error for a required builder field that was never set
    pub fn missing_config(field: &str) -> Self {
        Self::Config(format!("missing required field: {field}"))
    }

    /// Create a transport initialization error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportInit(message.into())
    }

    /// Create a fatal worker error
    pub fn worker_fatal(worker_id: usize, message: impl Into<String>) -> Self {
        Self::WorkerFatal {
            worker_id,
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole run rather than a single worker
    pub fn is_run_fatal(&self) -> bool {
        !matches!(self, Self::WorkerFatal { .. })
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
