//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGQUIT)
//! - Translate signals to shutdown requests
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGTERM/SIGINT request a graceful drain
//! - A repeated SIGTERM/SIGINT, or any SIGQUIT, kills workers immediately

use crate::lifecycle::shutdown::{Shutdown, ShutdownKind};

/// Signals the launcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
    Quit,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Terminate => "SIGTERM",
            Signal::Interrupt => "SIGINT",
            Signal::Quit => "SIGQUIT",
        }
    }
}

/// Map a signal to a shutdown request.
pub fn classify(signal: Signal, already_stopping: bool) -> ShutdownKind {
    match signal {
        Signal::Quit => ShutdownKind::Immediate,
        Signal::Terminate | Signal::Interrupt if already_stopping => ShutdownKind::Immediate,
        Signal::Terminate | Signal::Interrupt => ShutdownKind::Graceful,
    }
}

/// Forward OS signals to `shutdown` until an immediate stop was requested.
#[cfg(unix)]
pub async fn listen(shutdown: Shutdown) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut stopping = false;

    loop {
        let received = tokio::select! {
            _ = terminate.recv() => Signal::Terminate,
            _ = interrupt.recv() => Signal::Interrupt,
            _ = quit.recv() => Signal::Quit,
        };

        let kind = classify(received, stopping);
        stopping = true;
        tracing::info!(signal = received.name(), shutdown = ?kind, "Signal received");
        shutdown.send(kind);

        if kind == ShutdownKind::Immediate {
            return Ok(());
        }
    }
}

/// Forward Ctrl+C to `shutdown` until an immediate stop was requested.
#[cfg(not(unix))]
pub async fn listen(shutdown: Shutdown) -> std::io::Result<()> {
    let mut stopping = false;
    loop {
        tokio::signal::ctrl_c().await?;
        let kind = classify(Signal::Interrupt, stopping);
        stopping = true;
        tracing::info!(signal = "ctrl-c", shutdown = ?kind, "Signal received");
        shutdown.send(kind);
        if kind == ShutdownKind::Immediate {
            return Ok(());
        }
    }
}
