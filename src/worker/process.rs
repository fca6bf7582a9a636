//! Worker identity and the master's view of a running worker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::guard::InFlightRegistry;
use crate::worker::exit::KillSwitch;

/// Relaxed ordering is enough; ids only need to be unique.
static WORKER_PID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique worker identity. Never reused, so a respawned worker in
/// the same slot always has a different pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerPid(u64);

impl WorkerPid {
    pub fn next() -> Self {
        Self(WORKER_PID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for WorkerPid {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WorkerPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// What an application learns about the worker it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    pub pid: WorkerPid,
    pub slot: usize,
}

/// Master-side record of a started worker.
#[derive(Debug)]
pub struct WorkerProcess {
    pub pid: WorkerPid,
    pub slot: usize,
    pub thread_pool_size: usize,
    /// Serving the master's preloaded snapshot rather than its own load.
    pub parent_loaded_state: bool,
    pub started_at: Instant,
    pub ready: bool,
    pub(crate) kill: KillSwitch,
    pub(crate) drain: CancellationToken,
    pub(crate) inflight: InFlightRegistry,
}

impl WorkerProcess {
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            pid: self.pid,
            slot: self.slot,
            thread_pool_size: self.thread_pool_size,
            parent_loaded_state: self.parent_loaded_state,
            ready: self.ready,
        }
    }
}

/// Snapshot of a worker published in the fleet status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub pid: WorkerPid,
    pub slot: usize,
    pub thread_pool_size: usize,
    pub parent_loaded_state: bool,
    pub ready: bool,
}
