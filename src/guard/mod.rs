//! Request timeout guard.
//!
//! # Data Flow
//! ```text
//! request enters worker
//!     → timeout.rs stamps arrival, request queues for a thread slot
//!         → still queued at the deadline: 504, handler never runs
//!     → timeout.rs registers InFlightRequest (inflight.rs), starts deadline
//!     → handler runs with RequestCancellation in its extensions
//!     → deadline: cancel token
//!         → handler yields within grace: 504, worker keeps serving
//!         → handler ignores it: worker kill switch fires, master respawns
//! ```
//!
//! The master also sweeps every worker's registry, so a worker whose runtime
//! is wedged hard enough that its own guard never runs is still torn down.

pub mod inflight;
pub mod timeout;

pub use inflight::{InFlightRegistry, InFlightRequest, InFlightTicket};
pub use timeout::{admit_within_deadline, enforce_deadline, RequestCancellation, TimeoutGuard, X_REQUEST_ID};
