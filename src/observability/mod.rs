//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Master, workers and timeout guards produce:
//!     → logging.rs (structured log events, zoned timestamps)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for log aggregation)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging via `tracing`; fields, not interpolated strings
//! - Request ID and worker id flow through every request span
//! - Metrics are cheap (atomic increments) and no-ops when no recorder is installed

pub mod logging;
pub mod metrics;
