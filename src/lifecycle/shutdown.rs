//! Shutdown coordination for the launcher.

use tokio::sync::broadcast;

/// How the fleet should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// Stop accepting, finish in-flight requests up to the grace period.
    Graceful,
    /// Tear every worker down now.
    Immediate,
}

/// Coordinator for shutdown.
///
/// Provides a broadcast channel that the master (and anything else long
/// running) subscribes to. A graceful request may be followed by an
/// immediate one.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<ShutdownKind>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(4);
        Self { tx }
    }

    /// Subscribe to shutdown requests.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownKind> {
        self.tx.subscribe()
    }

    /// Request a graceful drain.
    pub fn trigger(&self) {
        self.send(ShutdownKind::Graceful);
    }

    /// Request an immediate stop.
    pub fn trigger_immediate(&self) {
        self.send(ShutdownKind::Immediate);
    }

    pub fn send(&self, kind: ShutdownKind) {
        let _ = self.tx.send(kind);
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_both_kinds_in_order() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.trigger();
        shutdown.trigger_immediate();

        assert_eq!(rx.recv().await.unwrap(), ShutdownKind::Graceful);
        assert_eq!(rx.recv().await.unwrap(), ShutdownKind::Immediate);
    }
}
