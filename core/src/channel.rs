//! Statistics channel between workers and the supervisor
//!
//! A connectionless Unix datagram socket, one per run. The supervisor binds it
//! before any worker exists; workers connect and fire datagrams at it without
//! acknowledgement. A datagram lost in transit is lost for good. Only local
//! send failures are retried, and only a bounded number of times.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixDatagram;

use crate::config::SendPolicy;
use crate::error::{BenchError, BenchResult};

/// Largest datagram the supervisor reads; longer payloads are truncated
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Generate a unique socket path inside `dir`
pub fn endpoint_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "sql-bench-{}-{}.sock",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ))
}

/// Supervisor end of the channel
///
/// Owns the socket file and removes it when dropped, so every exit path of a
/// run cleans up after itself.
#[derive(Debug)]
pub struct StatsReceiver {
    socket: UnixDatagram,
    path: PathBuf,
    buf: Vec<u8>,
}

impl StatsReceiver {
    /// Bind the socket at `path`, replacing a stale file left by an earlier run
    pub fn bind(path: impl Into<PathBuf>) -> BenchResult<Self> {
        let path = path.into();

        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale stats endpoint"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BenchError::transport(format!(
                    "cannot remove stale endpoint {}: {e}",
                    path.display()
                )))
            }
        }

        let socket = UnixDatagram::bind(&path).map_err(|e| {
            BenchError::transport(format!("cannot bind stats endpoint {}: {e}", path.display()))
        })?;

        tracing::debug!(path = %path.display(), "Stats endpoint bound");
        Ok(Self {
            socket,
            path,
            buf: vec![0; MAX_DATAGRAM_SIZE],
        })
    }

    /// Socket path workers connect to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next datagram
    ///
    /// Interrupted reads are retried. The returned slice is valid until the
    /// next call.
    pub async fn recv(&mut self) -> io::Result<&[u8]> {
        loop {
            match self.socket.recv(&mut self.buf).await {
                Ok(len) => return Ok(&self.buf[..len]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait at most `wait` for the next datagram
    ///
    /// Returns `None` once `wait` passes with nothing received. Used to drain
    /// the queue after the last worker exited: a non-blocking read could miss
    /// datagrams the runtime has not yet seen as readable.
    pub async fn recv_timeout(&mut self, wait: Duration) -> io::Result<Option<&[u8]>> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(Ok(bytes)) => Ok(Some(bytes)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for StatsReceiver {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove stats endpoint");
            }
        }
    }
}

/// Local failure to hand a datagram to the kernel
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Every attempt failed
    #[error("datagram dropped after {attempts} attempts: {last_error}")]
    GaveUp {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
    },
}

/// Worker end of the channel
#[derive(Debug)]
pub struct StatsSender {
    socket: UnixDatagram,
    policy: SendPolicy,
}

impl StatsSender {
    /// Connect to the supervisor's endpoint
    pub fn connect(path: &Path, policy: SendPolicy) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Self { socket, policy })
    }

    /// The retry policy in effect
    pub fn policy(&self) -> &SendPolicy {
        &self.policy
    }

    /// Send one datagram, best effort
    ///
    /// Success means the kernel accepted it, not that anyone read it.
    pub async fn send(&self, datagram: &[u8]) -> Result<(), SendError> {
        let mut attempts = 0;
        loop {
            let last_error = match tokio::time::timeout(
                self.policy.timeout,
                self.socket.send(datagram),
            )
            .await
            {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("send timed out after {:?}", self.policy.timeout),
            };

            attempts += 1;
            if attempts >= self.policy.max_attempts {
                return Err(SendError::GaveUp {
                    attempts,
                    last_error,
                });
            }

            tracing::debug!(attempt = attempts, error = %last_error, "Stats send failed, retrying");
            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}
