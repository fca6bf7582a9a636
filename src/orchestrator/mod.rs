//! Orchestration subsystem: the master process.
//!
//! # Data Flow
//! ```text
//! master.rs:
//!     preload (optional) → bind shared socket → start workers → supervise
//!         worker exit → crash_loop.rs → backoff delay → replacement
//!         overdue request → kill worker → replacement
//!         shutdown → drain or kill → Stopped
//!
//! state.rs:
//!     Uninitialized → Loading → Ready → Forking → Running → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - The master never serves requests; it only owns workers
//! - Status is published on a watch channel for handles to observe
//! - The fleet is never left partially alive when the launcher gives up

pub mod crash_loop;
pub mod master;
pub mod state;

pub use crash_loop::{CrashLoopDetector, RestartDecision};
pub use master::{FleetStatus, Launcher, LauncherHandle, SWEEP_INTERVAL};
pub use state::{InvalidTransition, LifecycleState};
