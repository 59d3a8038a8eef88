//! ==============================================================================
//! signals.rs - process stop signals
//! ==============================================================================
//!
//! purpose:
//!     one future that resolves on Ctrl-C (SIGINT) or, on unix, SIGTERM, so a
//!     terminal, systemd or `docker stop` all get the same graceful shutdown:
//!     the MQTT session is closed and the log sink drained.
//!
//! ==============================================================================

use std::io;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// stop signals, registered up front so one sent before `recv` is awaited is
/// not lost
pub struct StopSignals {
    #[cfg(unix)]
    terminate: Signal,
}

impl StopSignals {
    pub fn listen() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// wait for the first stop signal and return its name
    #[cfg(unix)]
    pub async fn recv(mut self) -> io::Result<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl-C")
    }
}
