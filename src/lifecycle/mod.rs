//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Install timezone → Init logging → Resolve topology → Run master
//!
//! Shutdown (shutdown.rs):
//!     Request received → Stop accepting → Drain in-flight → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Graceful drain
//!     Second SIGTERM/SIGINT, SIGQUIT → Immediate kill
//! ```
//!
//! # Design Decisions
//! - Ordered startup: timezone first, then logging, then config, then sockets
//! - Ordered shutdown: stop accept, drain, kill stragglers
//! - Shutdown has timeout: forced kill after the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownKind};
pub use startup::LauncherError;
