//! Worker termination: kill switch and exit reports.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::worker::WorkerPid;

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Finished in-flight work after a drain request.
    Drained,
    /// Killed by the master (immediate shutdown or explicit terminate).
    Killed,
    /// A request ignored its deadline and cancellation.
    TimedOut { request_id: Uuid },
    /// Per-worker application load failed (preload disabled).
    LoadFailed(String),
    /// Runtime failure or panic inside the worker.
    Crashed(String),
}

impl ExitReason {
    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::Drained => "drained",
            ExitReason::Killed => "killed",
            ExitReason::TimedOut { .. } => "timed_out",
            ExitReason::LoadFailed(_) => "load_failed",
            ExitReason::Crashed(_) => "crashed",
        }
    }

    /// The application or runtime failed, as opposed to the worker being
    /// stopped on purpose. Only failures count toward the crash-loop window.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::LoadFailed(_) | ExitReason::Crashed(_))
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Drained => write!(f, "drained"),
            ExitReason::Killed => write!(f, "killed"),
            ExitReason::TimedOut { request_id } => {
                write!(f, "request {} exceeded its deadline", request_id)
            }
            ExitReason::LoadFailed(msg) => write!(f, "application load failed: {}", msg),
            ExitReason::Crashed(msg) => write!(f, "crashed: {}", msg),
        }
    }
}

/// Exit report sent from a worker thread to the master.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    pub pid: WorkerPid,
    pub slot: usize,
    pub reason: ExitReason,
    pub uptime: Duration,
}

/// Messages from workers to the master.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Application loaded and listener registered; accepting connections.
    Ready { pid: WorkerPid },
    Exited(WorkerExit),
}

/// One-shot switch that tears a worker down.
///
/// The first reason recorded wins; later fires only re-cancel.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    token: CancellationToken,
    reason: Arc<OnceLock<ExitReason>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the switch. Returns `true` if this call set the reason.
    pub fn fire(&self, reason: ExitReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn fired(&self) {
        self.token.cancelled().await
    }

    pub fn reason(&self) -> Option<ExitReason> {
        self.reason.get().cloned()
    }
}
