//! Process-wide environment setup.
//!
//! # Data Flow
//! ```text
//! configured zone id ("Asia/Taipei")
//!     → timezone.rs (parse, install once, export TZ)
//!     → logging timer, application clocks, every worker
//! ```
//!
//! # Design Decisions
//! - Runs before logging, config resolution and any worker
//! - Unknown zone is fatal; nothing else starts
//! - Installed once; workers observe the same zone for their lifetime

pub mod timezone;

pub use timezone::{TimezoneError, ZonedTimer};
