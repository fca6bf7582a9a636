//! Shared listening socket.
//!
//! # Responsibilities
//! - Bind the configured address
//! - Hand each worker its own handle to the same socket
//! - Graceful handling of bind and duplication errors

use std::net::{SocketAddr, TcpListener};

use thiserror::Error;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Failed to duplicate the socket for a worker.
    #[error("Failed to share listener: {0}")]
    Share(#[source] std::io::Error),
}

/// The master's listening socket.
#[derive(Debug)]
pub struct SharedListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl SharedListener {
    /// Bind to `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind { addr, source };

        let inner = TcpListener::bind(addr).map_err(bind_err)?;
        inner.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// A new handle to the same socket for one worker.
    pub fn handle_for_worker(&self) -> Result<TcpListener, ListenerError> {
        self.inner.try_clone().map_err(ListenerError::Share)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_the_address() {
        let listener = SharedListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let handle = listener.handle_for_worker().unwrap();
        assert_eq!(handle.local_addr().unwrap(), listener.local_addr());
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn second_bind_on_same_port_fails() {
        let first = SharedListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = SharedListener::bind(first.local_addr()).unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }
}
