//! MySQL session driver
//!
//! One [`MySqlSession`] wraps a single, non-pooled `sqlx` connection. Per
//! query byte costs come from the connection-scoped `Bytes_sent` and
//! `Bytes_received` status counters.

use std::io;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Row};

use sql_bench_core::{
    DbConfig, DriverError, ParamValue, Session, SessionCounters, BYTES_RECEIVED, BYTES_SENT,
};

/// Status query for the session byte counters
///
/// Sent as a plain string so it runs over the text protocol and is never
/// prepared or cached.
const COUNTERS_QUERY: &str = "SHOW SESSION STATUS LIKE 'Bytes_%'";

/// A single MySQL connection owned by one worker
pub struct MySqlSession {
    options: MySqlConnectOptions,
    target: String,
    conn: Option<MySqlConnection>,
}

impl MySqlSession {
    /// Create an unconnected session for `config`
    pub fn new(config: &DbConfig) -> Self {
        Self {
            options: connect_options(config),
            target: describe_target(config),
            conn: None,
        }
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection, DriverError> {
        self.conn.as_mut().ok_or(DriverError::NotConnected)
    }
}

impl std::fmt::Debug for MySqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSession")
            .field("target", &self.target)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

#[async_trait]
impl Session for MySqlSession {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> Result<(), DriverError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(|e| {
                if interrupted(&e) {
                    DriverError::Interrupted
                } else {
                    DriverError::Connect(format!("{}: {e}", self.target))
                }
            })?;

        tracing::debug!(target_db = %self.target, "Connected");
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "Error while closing connection");
            }
        }
    }

    async fn is_alive(&mut self) -> Result<bool, DriverError> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(false);
        };
        match conn.ping().await {
            Ok(()) => Ok(true),
            Err(e) => classify_probe_error(e),
        }
    }

    async fn execute(&mut self, statement: &str, params: &[ParamValue]) -> Result<u64, DriverError> {
        let conn = self.conn()?;

        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                ParamValue::Int(value) => query.bind(*value),
                ParamValue::Text(value) => query.bind(value.as_str()),
            };
        }

        let rows = query.fetch_all(&mut *conn).await.map_err(query_error)?;
        Ok(rows.len() as u64)
    }

    async fn session_counters(&mut self) -> Result<SessionCounters, DriverError> {
        let conn = self.conn()?;

        let rows: Vec<MySqlRow> = sqlx::Executor::fetch_all(&mut *conn, COUNTERS_QUERY)
            .await
            .map_err(|e| {
                if interrupted(&e) {
                    DriverError::Interrupted
                } else {
                    DriverError::Counters(e.to_string())
                }
            })?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: Vec<u8> = row
                .try_get(0)
                .map_err(|e| DriverError::Counters(e.to_string()))?;
            let value: Vec<u8> = row
                .try_get(1)
                .map_err(|e| DriverError::Counters(e.to_string()))?;
            pairs.push((
                String::from_utf8_lossy(&name).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            ));
        }

        parse_counters(pairs)
    }
}

/// Connection options for `config`
///
/// A socket path wins over host and port. Statement logging is off: every
/// benchmark query would otherwise be logged.
pub fn connect_options(config: &DbConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .username(&config.user)
        .host(&config.host)
        .port(config.port);

    if let Some(socket) = &config.socket {
        options = options.socket(socket);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }

    options.disable_statement_logging()
}

fn describe_target(config: &DbConfig) -> String {
    match &config.socket {
        Some(socket) => format!("{}@{}", config.user, socket.display()),
        None => format!("{}@{}:{}", config.user, config.host, config.port),
    }
}

fn interrupted(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(e) if e.kind() == io::ErrorKind::Interrupted)
}

/// Map a failed ping to the probe contract
///
/// Transport and protocol failures mean the connection is gone and may be
/// re-established; anything else is unrecoverable.
fn classify_probe_error(err: sqlx::Error) -> Result<bool, DriverError> {
    match err {
        e if interrupted(&e) => Err(DriverError::Interrupted),
        sqlx::Error::Io(_) | sqlx::Error::Protocol(_) => Ok(false),
        other => Err(DriverError::Probe(other.to_string())),
    }
}

fn query_error(err: sqlx::Error) -> DriverError {
    if interrupted(&err) {
        DriverError::Interrupted
    } else {
        DriverError::Query(err.to_string())
    }
}

/// Turn `(Variable_name, Value)` rows into lowercase counter names
fn parse_counters<I>(rows: I) -> Result<SessionCounters, DriverError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut counters = SessionCounters::new();
    for (name, value) in rows {
        let parsed = value.trim().parse::<u64>().map_err(|_| {
            DriverError::Counters(format!("non-numeric value '{value}' for {name}"))
        })?;
        counters.insert(name.to_ascii_lowercase(), parsed);
    }

    for required in [BYTES_SENT, BYTES_RECEIVED] {
        if !counters.contains_key(required) {
            return Err(DriverError::Counters(format!("{required} not reported")));
        }
    }
    Ok(counters)
}
