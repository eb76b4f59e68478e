//! OS signal handling.
//!
//! # Responsibilities
//! - Translate signals to internal events
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP triggers a target reload, not a shutdown

/// Internal event derived from an OS signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Reload,
}

/// Installed signal handlers. Handlers are registered once so signals
/// arriving between polls are not lost.
#[cfg(unix)]
pub struct Signals {
    sigterm: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next relevant OS signal.
    pub async fn next(&mut self) -> Signal {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => Signal::Shutdown,
            _ = self.sigterm.recv() => Signal::Shutdown,
            _ = self.sighup.recv() => Signal::Reload,
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn next(&mut self) -> Signal {
        let _ = tokio::signal::ctrl_c().await;
        Signal::Shutdown
    }
}
