//! Termination and interrupt signal handling
//!
//! Both SIGTERM and SIGINT mean "begin a graceful stop". The supervisor turns
//! them into loop events; workers turn them into their local stop flag.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// Which stop signal arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM
    Terminate,
    /// SIGINT (Ctrl+C)
    Interrupt,
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopSignal::Terminate => write!(f, "SIGTERM"),
            StopSignal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Listener for SIGTERM and SIGINT
#[derive(Debug)]
pub struct SignalListener {
    terminate: Signal,
    interrupt: Signal,
}

impl SignalListener {
    /// Install the handlers
    ///
    /// Must be called from within a tokio runtime.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next stop signal
    pub async fn recv(&mut self) -> StopSignal {
        tokio::select! {
            Some(()) = self.terminate.recv() => StopSignal::Terminate,
            Some(()) = self.interrupt.recv() => StopSignal::Interrupt,
            else => std::future::pending().await,
        }
    }
}
