//! Worker subsystem.
//!
//! A worker stands in for a forked child process: a dedicated OS thread
//! driving its own multi-thread Tokio runtime. Tearing the runtime down drops
//! every task and connection the worker owns, which is what killing a forked
//! child does.
//!
//! # Worker Phases
//! ```text
//! Loading (preload off only) → Ready → Serving → Draining → Stopped
//!                                         └──── kill switch ────┘
//! ```
//!
//! # Design Decisions
//! - One runtime per worker; nothing mutable is shared between workers
//! - The shared listening socket is duplicated per worker; the kernel picks
//!   which worker accepts each connection
//! - Exit is always reported to the master, including after a panic

pub mod exit;
pub mod process;
pub mod runtime;

pub use exit::{ExitReason, KillSwitch, WorkerEvent, WorkerExit};
pub use process::{WorkerContext, WorkerInfo, WorkerPid, WorkerProcess};
pub use runtime::X_WORKER_ID;
