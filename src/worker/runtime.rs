//! Worker thread body.
//!
//! # Responsibilities
//! - Build the worker's runtime with `threads_per_worker` threads
//! - Load the application when preload is off
//! - Serve the application on the worker's copy of the shared socket
//! - Drain on request, tear down on kill, report the exit

use std::any::Any;
use std::net::TcpListener as StdTcpListener;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware, Router,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::app::{AppLoader, Application};
use crate::guard::{admit_within_deadline, enforce_deadline, InFlightRegistry, TimeoutGuard};
use crate::worker::{ExitReason, KillSwitch, WorkerContext, WorkerEvent, WorkerExit, WorkerPid};

/// Response header naming the worker that served the request.
pub const X_WORKER_ID: HeaderName = HeaderName::from_static("x-worker-id");

/// Where a worker gets its application from.
pub(crate) enum AppSource<L: AppLoader> {
    /// The master's loaded snapshot.
    Preloaded(Arc<L::App>),
    /// Load inside the worker.
    Deferred(Arc<L>),
}

impl<L: AppLoader> AppSource<L> {
    pub(crate) fn is_preloaded(&self) -> bool {
        matches!(self, AppSource::Preloaded(_))
    }
}

impl<L: AppLoader> Clone for AppSource<L> {
    fn clone(&self) -> Self {
        match self {
            AppSource::Preloaded(app) => AppSource::Preloaded(Arc::clone(app)),
            AppSource::Deferred(loader) => AppSource::Deferred(Arc::clone(loader)),
        }
    }
}

/// Everything a worker thread needs, moved into it at spawn.
pub(crate) struct WorkerSpec<L: AppLoader> {
    pub context: WorkerContext,
    pub threads: usize,
    pub request_timeout: Duration,
    pub cancel_grace: Duration,
    pub source: AppSource<L>,
    pub listener: StdTcpListener,
    pub inflight: InFlightRegistry,
    pub kill: KillSwitch,
    pub drain: CancellationToken,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
}

/// Start the worker thread.
pub(crate) fn spawn<L: AppLoader>(spec: WorkerSpec<L>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(spec.context.pid.to_string())
        .spawn(move || run(spec))
        .map(|_| ())
}

fn run<L: AppLoader>(spec: WorkerSpec<L>) {
    let started = Instant::now();
    let WorkerContext { pid, slot } = spec.context;
    let events = spec.events.clone();
    let kill = spec.kill.clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(spec.threads)
        .thread_name(format!("{}-rt", pid))
        .enable_all()
        .build();

    let reason = match runtime {
        Ok(runtime) => {
            let kill_signal = kill.clone();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                runtime.block_on(async move {
                    tokio::select! {
                        biased;
                        _ = kill_signal.fired() => None,
                        reason = serve(spec) => Some(reason),
                    }
                })
            }));
            // Abandons anything still running, including wedged handlers.
            runtime.shutdown_background();

            match outcome {
                Ok(Some(reason)) => reason,
                Ok(None) => ExitReason::Killed,
                Err(panic) => ExitReason::Crashed(panic_message(panic.as_ref())),
            }
        }
        Err(e) => ExitReason::Crashed(format!("failed to build runtime: {}", e)),
    };
    let reason = kill.reason().unwrap_or(reason);

    tracing::info!(worker = %pid, slot, reason = %reason, "Worker exited");
    let _ = events.send(WorkerEvent::Exited(WorkerExit {
        pid,
        slot,
        reason,
        uptime: started.elapsed(),
    }));
}

async fn serve<L: AppLoader>(spec: WorkerSpec<L>) -> ExitReason {
    let WorkerSpec {
        context,
        threads,
        request_timeout,
        cancel_grace,
        source,
        listener,
        inflight,
        kill,
        drain,
        events,
    } = spec;
    let preloaded = source.is_preloaded();

    let app = match source {
        AppSource::Preloaded(app) => app,
        AppSource::Deferred(loader) => {
            tracing::info!(worker = %context.pid, "Loading application in worker");
            match loader.load() {
                Ok(app) => Arc::new(app),
                Err(e) => {
                    tracing::error!(worker = %context.pid, error = %e, "Application failed to load");
                    return ExitReason::LoadFailed(e.to_string());
                }
            }
        }
    };

    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => return ExitReason::Crashed(format!("failed to register listener: {}", e)),
    };

    let guard = TimeoutGuard::new(context.pid, request_timeout, cancel_grace, inflight, kill);
    let router = build_router(app.router(&context), guard, threads, context.pid);

    let _ = events.send(WorkerEvent::Ready { pid: context.pid });
    tracing::info!(
        worker = %context.pid,
        slot = context.slot,
        threads,
        preloaded,
        "Worker serving"
    );

    match axum::serve(listener, router)
        .with_graceful_shutdown(drain.cancelled_owned())
        .await
    {
        Ok(()) => ExitReason::Drained,
        Err(e) => ExitReason::Crashed(e.to_string()),
    }
}

/// Wrap an application router in the worker's middleware stack.
///
/// Outermost first: request id, trace span, worker id header, arrival clock,
/// concurrency limit (`threads` slots), deadline guard.
pub(crate) fn build_router(
    app: Router,
    guard: TimeoutGuard,
    threads: usize,
    pid: WorkerPid,
) -> Router {
    app.layer(middleware::from_fn_with_state(guard.clone(), enforce_deadline))
        .layer(GlobalConcurrencyLimitLayer::new(threads))
        .layer(middleware::from_fn_with_state(guard, admit_within_deadline))
        .layer(SetResponseHeaderLayer::overriding(
            X_WORKER_ID,
            HeaderValue::from(pid.as_u64()),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(move |request: &Request| {
                tracing::info_span!(
                    "request",
                    worker = %pid,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
