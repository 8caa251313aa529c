//! Run, database and worker configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::QueryDef;
use crate::schedule::{Schedule, MAX_SCHEDULE_SIZE};

/// Database connection parameters handed to every worker
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbConfig {
    /// Server host name
    pub host: String,

    /// Server port
    pub port: u16,

    /// Login user
    pub user: String,

    /// Login password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Default schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Unix socket path; takes precedence over host/port when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3306,
            user: "root".into(),
            password: None,
            database: None,
            socket: None,
        }
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("socket", &self.socket)
            .finish()
    }
}

/// Bounded retry policy for local datagram send failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPolicy {
    /// Upper bound on a single send call
    pub timeout: Duration,

    /// Attempts before a datagram is given up on
    pub max_attempts: u32,

    /// Fixed pause between attempts
    pub backoff: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_attempts: 10,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Controller-side configuration of a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of worker processes
    pub workers: usize,

    /// Wall-clock duration of the run
    pub runtime: Duration,

    /// Minimum time between two worker flushes
    pub flush_interval: Duration,

    /// Target number of entries in a normalized schedule
    pub max_schedule_size: usize,

    /// Give every worker its own random permutation of the schedule
    pub shuffle: bool,

    /// How often the supervisor wakes up when no datagram arrives
    pub tick_interval: Duration,

    /// Worker send policy
    pub send_policy: SendPolicy,

    /// Directory for the statistics socket
    pub endpoint_dir: PathBuf,

    /// Database connection parameters
    pub db: DbConfig,

    /// Verbose logging in workers
    pub verbose: bool,

    /// Debug logging in workers
    pub debug: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            runtime: Duration::from_secs(10),
            flush_interval: Duration::from_secs(1),
            max_schedule_size: 100,
            shuffle: true,
            tick_interval: Duration::from_millis(100),
            send_policy: SendPolicy::default(),
            endpoint_dir: std::env::temp_dir(),
            db: DbConfig::default(),
            verbose: false,
            debug: false,
        }
    }
}

impl RunConfig {
    /// Create a new config with the given worker count
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Set the run duration
    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    /// Set the worker flush interval
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the schedule size target
    pub fn with_max_schedule_size(mut self, size: usize) -> Self {
        self.max_schedule_size = size;
        self
    }

    /// Set the database parameters
    pub fn with_db(mut self, db: DbConfig) -> Self {
        self.db = db;
        self
    }

    /// Set the statistics socket directory
    pub fn with_endpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.endpoint_dir = dir.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(
                "worker count must be at least 1".into(),
            ));
        }

        if self.runtime.is_zero() {
            return Err(ConfigError::InvalidDuration("runtime must be positive".into()));
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidDuration(
                "flush interval must be positive".into(),
            ));
        }

        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidDuration(
                "tick interval must be positive".into(),
            ));
        }

        if self.max_schedule_size == 0 {
            return Err(ConfigError::InvalidScheduleSize(
                "max schedule size must be at least 1".into(),
            ));
        }

        if self.max_schedule_size > MAX_SCHEDULE_SIZE {
            return Err(ConfigError::InvalidScheduleSize(format!(
                "max schedule size must be at most {MAX_SCHEDULE_SIZE}"
            )));
        }

        if self.send_policy.max_attempts == 0 {
            return Err(ConfigError::InvalidSendPolicy(
                "send attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// Everything a worker process needs, passed over its stdin at spawn time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker index within the run
    pub worker_id: usize,

    /// Query definitions; schedule entries index into this list
    pub queries: Vec<QueryDef>,

    /// This worker's execution order
    pub schedule: Schedule,

    /// Database connection parameters
    pub db: DbConfig,

    /// Statistics socket path
    pub endpoint: PathBuf,

    /// Minimum time between flushes
    pub flush_interval: Duration,

    /// Datagram send policy
    pub send_policy: SendPolicy,

    /// Verbose logging
    pub verbose: bool,

    /// Debug logging
    pub debug: bool,
}

impl WorkerConfig {
    /// Identifier used as the stats message source
    pub fn source_id(&self) -> String {
        format!("worker-{}", self.worker_id)
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count: {0}")]
    InvalidWorkers(String),

    /// Invalid duration
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Invalid schedule size
    #[error("Invalid schedule size: {0}")]
    InvalidScheduleSize(String),

    /// Invalid send policy
    #[error("Invalid send policy: {0}")]
    InvalidSendPolicy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.runtime, Duration::from_secs(10));
        assert!(config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_pattern() {
        let config = RunConfig::new(8)
            .with_runtime(Duration::from_secs(60))
            .with_flush_interval(Duration::from_millis(500))
            .with_max_schedule_size(1000);

        assert_eq!(config.workers, 8);
        assert_eq!(config.runtime, Duration::from_secs(60));
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.max_schedule_size, 1000);
    }

    #[test]
    fn test_config_validation_zero_workers() {
        assert!(matches!(
            RunConfig::new(0).validate(),
            Err(ConfigError::InvalidWorkers(_))
        ));
    }

    #[test]
    fn test_config_validation_zero_runtime() {
        let config = RunConfig::new(1).with_runtime(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_config_validation_zero_flush_interval() {
        let config = RunConfig::new(1).with_flush_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_schedule_size() {
        let config = RunConfig::new(1).with_max_schedule_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidScheduleSize(_))
        ));
    }

    #[test]
    fn test_config_validation_huge_schedule_size() {
        let config = RunConfig::new(1).with_max_schedule_size(usize::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidScheduleSize(_))
        ));
        assert!(RunConfig::new(1)
            .with_max_schedule_size(MAX_SCHEDULE_SIZE)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_db_config_debug_hides_password() {
        let db = DbConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", db);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_worker_config_serialization() {
        let config = WorkerConfig {
            worker_id: 3,
            queries: vec![QueryDef::new("q", "SELECT 1")],
            schedule: Schedule::from_entries(vec![0, 0]),
            db: DbConfig::default(),
            endpoint: PathBuf::from("/tmp/sql-bench.sock"),
            flush_interval: Duration::from_millis(250),
            send_policy: SendPolicy::default(),
            verbose: true,
            debug: false,
        };

        let json = serde_json::to_string(&config).unwrap();
        let decoded: WorkerConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.worker_id, 3);
        assert_eq!(decoded.schedule, config.schedule);
        assert_eq!(decoded.flush_interval, Duration::from_millis(250));
        assert_eq!(decoded.source_id(), "worker-3");
    }
}
