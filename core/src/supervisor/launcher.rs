//! Spawning and signalling worker processes

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use crate::config::WorkerConfig;
use crate::error::{BenchError, BenchResult};

/// Starts worker processes and delivers stop signals to them
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Spawn one worker and hand it its configuration
    async fn launch(&self, config: &WorkerConfig) -> BenchResult<Child>;

    /// Ask a worker to stop gracefully
    fn terminate(&self, pid: u32) -> io::Result<()> {
        send_sigterm(pid)
    }
}

/// Send SIGTERM to `pid`; a process that is already gone is not an error
pub fn send_sigterm(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Launches workers by re-executing a program with a worker subcommand
///
/// The JSON-encoded [`WorkerConfig`] is written to the child's stdin, which
/// is then closed. stdout and stderr are inherited.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Launch `program` with `args`
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-execute the current binary as `<exe> worker`
    pub fn current_exe() -> BenchResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| BenchError::transport(format!("cannot locate own executable: {e}")))?;
        Ok(Self::new(program, ["worker"]))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, config: &WorkerConfig) -> BenchResult<Child> {
        let payload = serde_json::to_vec(config)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                BenchError::transport(format!(
                    "cannot spawn worker {} ({}): {e}",
                    config.worker_id,
                    self.program.display()
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            BenchError::transport(format!("worker {} has no stdin", config.worker_id))
        })?;

        let written = async {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        }
        .await;
        // Closing the pipe marks the end of the configuration
        drop(stdin);

        if let Err(e) = written {
            let _ = child.start_kill();
            return Err(BenchError::transport(format!(
                "cannot pass configuration to worker {}: {e}",
                config.worker_id
            )));
        }

        tracing::debug!(
            worker_id = config.worker_id,
            pid = ?child.id(),
            bytes = payload.len(),
            "Worker launched"
        );
        Ok(child)
    }
}
