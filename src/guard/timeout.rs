//! Per-request deadline enforcement.
//!
//! # Responsibilities
//! - Stamp the arrival time before the request queues for a thread slot
//! - Register every request in the worker's in-flight registry
//! - Hand the handler a cancellation token carrying its deadline
//! - At the deadline, cancel cooperatively; after the grace period, kill the worker
//!
//! # Design Decisions
//! - Deadline is wall-clock from arrival, so time spent queued behind the
//!   concurrency limit counts against it
//! - A request still queued at its deadline gets a 504 without ever running
//! - A handler that yields after cancellation costs a 504, not the worker
//! - A handler that does not yield may hold locks or corrupt state, so the
//!   whole worker goes; the response is never sent and the client sees the
//!   connection drop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::guard::inflight::{InFlightRegistry, InFlightRequest};
use crate::observability::metrics;
use crate::worker::{ExitReason, KillSwitch, WorkerPid};

/// Request id header set by the outer request-id layer.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Deadline settings and kill wiring for one worker.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    worker: WorkerPid,
    request_timeout: Duration,
    cancel_grace: Duration,
    inflight: InFlightRegistry,
    kill: KillSwitch,
}

impl TimeoutGuard {
    pub fn new(
        worker: WorkerPid,
        request_timeout: Duration,
        cancel_grace: Duration,
        inflight: InFlightRegistry,
        kill: KillSwitch,
    ) -> Self {
        Self {
            worker,
            request_timeout,
            cancel_grace,
            inflight,
            kill,
        }
    }
}

/// Cooperative cancellation handed to handlers as a request extension.
///
/// Handlers doing long work should race it against `cancelled()`.
#[derive(Debug, Clone)]
pub struct RequestCancellation {
    request_id: Uuid,
    token: CancellationToken,
    deadline: Instant,
}

impl RequestCancellation {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the deadline has passed.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Set by [`admit_within_deadline`] before the request waits for a slot.
#[derive(Debug, Clone)]
struct RequestArrival {
    at: Instant,
    admitted: Arc<AtomicBool>,
}

fn timeout_response(request_timeout: Duration) -> Response {
    (
        StatusCode::GATEWAY_TIMEOUT,
        format!("request exceeded its {}s deadline\n", request_timeout.as_secs()),
    )
        .into_response()
}

fn request_id_of(request: &Request) -> Uuid {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Outer middleware, installed outside the concurrency limit.
///
/// Starts the request's clock and answers 504 if the deadline passes before
/// [`enforce_deadline`] admits it.
pub async fn admit_within_deadline(
    State(guard): State<TimeoutGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let arrival = RequestArrival {
        at: Instant::now(),
        admitted: Arc::new(AtomicBool::new(false)),
    };
    let deadline = arrival.at + guard.request_timeout;
    request.extensions_mut().insert(arrival.clone());

    let queued = next.run(request);
    tokio::pin!(queued);

    tokio::select! {
        response = &mut queued => return response,
        _ = tokio::time::sleep_until(deadline.into()) => {}
    }

    // Once admitted, the inner guard owns the deadline.
    if arrival.admitted.load(Ordering::Acquire) {
        return queued.await;
    }

    metrics::record_request_timeout("queued");
    metrics::record_request(StatusCode::GATEWAY_TIMEOUT.as_u16(), arrival.at);
    tracing::warn!(
        worker = %guard.worker,
        timeout_secs = guard.request_timeout.as_secs(),
        "Request deadline elapsed while waiting for a thread slot"
    );
    timeout_response(guard.request_timeout)
}

/// Middleware body; install with `axum::middleware::from_fn_with_state`
/// inside the concurrency limit.
pub async fn enforce_deadline(
    State(guard): State<TimeoutGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = match request.extensions().get::<RequestArrival>() {
        Some(arrival) => {
            arrival.admitted.store(true, Ordering::Release);
            arrival.at
        }
        None => Instant::now(),
    };
    let request_id = request_id_of(&request);
    let in_flight = InFlightRequest::new(request_id, started, guard.request_timeout);
    let deadline = in_flight.deadline;
    let _ticket = guard.inflight.begin(in_flight);

    let token = CancellationToken::new();
    request.extensions_mut().insert(RequestCancellation {
        request_id,
        token: token.clone(),
        deadline,
    });

    let handler = next.run(request);
    tokio::pin!(handler);

    tokio::select! {
        response = &mut handler => {
            metrics::record_request(response.status().as_u16(), started);
            return response;
        }
        _ = tokio::time::sleep_until(deadline.into()) => {}
    }

    token.cancel();
    tracing::warn!(
        worker = %guard.worker,
        request_id = %request_id,
        timeout_secs = guard.request_timeout.as_secs(),
        "Request deadline elapsed, cancelling handler"
    );

    match tokio::time::timeout(guard.cancel_grace, &mut handler).await {
        Ok(_) => {
            metrics::record_request_timeout("cancelled");
            metrics::record_request(StatusCode::GATEWAY_TIMEOUT.as_u16(), started);
            timeout_response(guard.request_timeout)
        }
        Err(_) => {
            metrics::record_request_timeout("killed");
            tracing::error!(
                worker = %guard.worker,
                request_id = %request_id,
                grace_ms = guard.cancel_grace.as_millis() as u64,
                "Handler ignored cancellation, terminating worker"
            );
            guard.kill.fire(ExitReason::TimedOut { request_id });
            // The worker runtime is torn down underneath this future.
            std::future::pending::<Response>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Extension, Router};
    use tower::{limit::GlobalConcurrencyLimitLayer, ServiceExt};

    fn guarded(router: Router, timeout: Duration, grace: Duration) -> (Router, KillSwitch, InFlightRegistry) {
        let kill = KillSwitch::new();
        let inflight = InFlightRegistry::new();
        let guard = TimeoutGuard::new(WorkerPid::next(), timeout, grace, inflight.clone(), kill.clone());
        let router = router.layer(axum::middleware::from_fn_with_state(guard, enforce_deadline));
        (router, kill, inflight)
    }

    /// One thread slot, with the arrival clock outside the limit.
    fn single_slot(router: Router, timeout: Duration, grace: Duration) -> (Router, KillSwitch, InFlightRegistry) {
        let kill = KillSwitch::new();
        let inflight = InFlightRegistry::new();
        let guard = TimeoutGuard::new(WorkerPid::next(), timeout, grace, inflight.clone(), kill.clone());
        let router = router
            .layer(axum::middleware::from_fn_with_state(guard.clone(), enforce_deadline))
            .layer(GlobalConcurrencyLimitLayer::new(1))
            .layer(axum::middleware::from_fn_with_state(guard, admit_within_deadline));
        (router, kill, inflight)
    }

    async fn wait_until_busy(inflight: &InFlightRegistry) {
        while inflight.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn get_request(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn fast_handler_passes_through() {
        let (router, kill, inflight) = guarded(
            Router::new().route("/", get(|| async { "ok" })),
            Duration::from_secs(5),
            Duration::from_millis(100),
        );

        let response = router.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!kill.is_fired());
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn handler_sees_its_deadline() {
        let (router, _, _) = guarded(
            Router::new().route(
                "/",
                get(|Extension(cancel): Extension<RequestCancellation>| async move {
                    assert!(!cancel.is_cancelled());
                    assert!(cancel.remaining() <= Duration::from_secs(5));
                    cancel.request_id().to_string()
                }),
            ),
            Duration::from_secs(5),
            Duration::from_millis(100),
        );

        let id = Uuid::new_v4();
        let request = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, id.to_string())
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, id.to_string());
    }

    #[tokio::test]
    async fn cooperative_handler_gets_504_and_worker_survives() {
        let (router, kill, inflight) = guarded(
            Router::new().route(
                "/",
                get(|Extension(cancel): Extension<RequestCancellation>| async move {
                    tokio::select! {
                        _ = cancel.cancelled() => "gave up",
                        _ = tokio::time::sleep(Duration::from_secs(30)) => "finished",
                    }
                }),
            ),
            Duration::from_millis(100),
            Duration::from_millis(500),
        );

        let response = router.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(!kill.is_fired());
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn stubborn_handler_fires_kill_switch() {
        let (router, kill, inflight) = guarded(
            Router::new().route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "too late"
                }),
            ),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );

        let pending = tokio::spawn(router.oneshot(get_request("/")));
        tokio::time::timeout(Duration::from_secs(5), kill.fired())
            .await
            .expect("kill switch should fire");

        assert!(matches!(kill.reason(), Some(ExitReason::TimedOut { .. })));
        assert_eq!(inflight.len(), 1);

        pending.abort();
        let _ = pending.await;
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn queued_request_times_out_from_arrival() {
        let (router, kill, inflight) = single_slot(
            Router::new().route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "too late"
                }),
            ),
            Duration::from_millis(200),
            Duration::from_secs(5),
        );

        let holder = tokio::spawn(router.clone().oneshot(get_request("/")));
        wait_until_busy(&inflight).await;

        let arrived = Instant::now();
        let response = router.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(arrived.elapsed() < Duration::from_secs(1));
        // The queued request never ran, so only the holder is registered.
        assert_eq!(inflight.len(), 1);
        assert!(!kill.is_fired());

        holder.abort();
        let _ = holder.await;
    }

    #[tokio::test]
    async fn late_admission_keeps_arrival_deadline() {
        let (router, kill, inflight) = single_slot(
            Router::new().route(
                "/",
                get(|Extension(cancel): Extension<RequestCancellation>| async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    cancel.remaining().as_millis().to_string()
                }),
            ),
            Duration::from_secs(2),
            Duration::from_millis(500),
        );

        let first = tokio::spawn(router.clone().oneshot(get_request("/")));
        wait_until_busy(&inflight).await;
        let second = router.oneshot(get_request("/")).await.unwrap();

        assert_eq!(second.status(), StatusCode::OK);
        let body = axum::body::to_bytes(second.into_body(), 64).await.unwrap();
        let remaining: u64 = std::str::from_utf8(&body).unwrap().parse().unwrap();
        // Queued ~500ms behind the first request, then ran 500ms itself.
        assert!(remaining <= 1250, "deadline restarted on admission: {}ms left", remaining);

        assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
        assert!(!kill.is_fired());
        assert!(inflight.is_empty());
    }
}
