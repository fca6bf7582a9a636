//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker failure (load failure or crash):
//!     → orchestrator/crash_loop.rs (count exits in the window)
//!     → backoff.rs (delay before the replacement starts)
//! ```
//!
//! # Design Decisions
//! - First replacement is immediate; only repeated failures back off
//! - Jitter spreads restarts of several slots failing together

pub mod backoff;
