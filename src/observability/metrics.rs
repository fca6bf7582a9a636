//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define launcher metrics (workers, exits, requests, timeouts)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `launcher_workers_alive` (gauge): live workers
//! - `launcher_worker_spawns_total` (counter): workers started
//! - `launcher_worker_exits_total` (counter): exits by reason
//! - `launcher_requests_total` (counter): completed requests by status
//! - `launcher_request_duration_seconds` (histogram): latency distribution
//! - `launcher_request_timeouts_total` (counter): deadline hits by outcome
//!
//! # Design Decisions
//! - Recording through the `metrics` facade; nothing is recorded until an
//!   exporter is installed
//! - Exporter is opt-in so a default launch binds only `PORT`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_workers_alive(count: usize) {
    metrics::gauge!("launcher_workers_alive").set(count as f64);
}

pub fn record_worker_spawn(preloaded: bool) {
    let mode = if preloaded { "preloaded" } else { "deferred" };
    metrics::counter!("launcher_worker_spawns_total", "mode" => mode).increment(1);
}

pub fn record_worker_exit(reason: &'static str) {
    metrics::counter!("launcher_worker_exits_total", "reason" => reason).increment(1);
}

pub fn record_request(status: u16, start: Instant) {
    metrics::counter!("launcher_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("launcher_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

/// `outcome` is `queued` when the request never got a thread slot,
/// `cancelled` when the handler yielded, `killed` otherwise.
pub fn record_request_timeout(outcome: &'static str) {
    metrics::counter!("launcher_request_timeouts_total", "outcome" => outcome).increment(1);
}
