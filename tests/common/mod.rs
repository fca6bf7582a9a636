//! Shared utilities for launcher integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Router,
};
use prefork_launcher::config::{resolve, LauncherConfig, ProcessConfiguration, PORT_VAR};
use prefork_launcher::guard::RequestCancellation;
use prefork_launcher::worker::X_WORKER_ID;
use prefork_launcher::{
    AppLoader, Application, FleetStatus, Launcher, LauncherError, LauncherHandle, LifecycleState,
    Shutdown, WorkerContext, WorkerPid,
};
use tokio::task::JoinHandle;

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Loopback config with short timeouts so failure paths finish quickly.
pub fn test_config(workers: usize, preload: bool) -> LauncherConfig {
    let mut config = LauncherConfig::default();
    config.preload = preload;
    config.listener.host = "127.0.0.1".into();
    config.workers.count = workers;
    config.workers.threads = 2;
    config.timeouts.request_secs = 1;
    config.timeouts.graceful_secs = 2;
    config.timeouts.cancel_grace_ms = 300;
    config.crash_loop.backoff_base_ms = 10;
    config.crash_loop.backoff_max_ms = 50;
    config
}

pub fn resolve_on(config: &LauncherConfig, port: u16) -> ProcessConfiguration {
    let env = HashMap::from([(PORT_VAR.to_string(), port.to_string())]);
    resolve(config, &env).unwrap()
}

/// Test application.
///
/// - `/` answers immediately
/// - `/sleep/{ms}` sleeps and ignores cancellation
/// - `/cooperative/{ms}` sleeps until done or cancelled
/// - `/block/{ms}` blocks its runtime thread
/// - `/tracked/{ms}` sleeps while counted in [`Activity`]
#[derive(Default)]
pub struct TestApp {
    activity: Arc<Activity>,
}

impl Application for TestApp {
    fn router(self: Arc<Self>, _worker: &WorkerContext) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/sleep/{ms}", get(stubborn_sleep))
            .route("/cooperative/{ms}", get(cooperative_sleep))
            .route("/block/{ms}", get(blocking_sleep))
            .route("/tracked/{ms}", get(tracked_sleep))
            .with_state(self)
    }
}

/// Handlers currently running, and the most ever seen at once.
#[derive(Debug, Default)]
pub struct Activity {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Activity {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

async fn tracked_sleep(State(app): State<Arc<TestApp>>, Path(ms): Path<u64>) -> &'static str {
    app.activity.enter();
    tokio::time::sleep(Duration::from_millis(ms)).await;
    app.activity.exit();
    "slept"
}

async fn stubborn_sleep(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "slept"
}

async fn cooperative_sleep(
    Path(ms): Path<u64>,
    Extension(cancel): Extension<RequestCancellation>,
) -> Result<&'static str, StatusCode> {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok("slept"),
        _ = cancel.cancelled() => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn blocking_sleep(Path(ms): Path<u64>) -> &'static str {
    std::thread::sleep(Duration::from_millis(ms));
    "slept"
}

/// Loader returning [`TestApp`] and counting how often it ran.
pub fn counting_loader() -> (impl AppLoader, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let loader = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Infallible>(TestApp::default())
    };
    (loader, loads)
}

/// Loader whose apps all report into one shared [`Activity`].
pub fn tracking_loader() -> (impl AppLoader, Arc<Activity>) {
    let activity = Arc::new(Activity::default());
    let shared = activity.clone();
    let loader = move || {
        Ok::<_, Infallible>(TestApp {
            activity: shared.clone(),
        })
    };
    (loader, activity)
}

pub fn failing_loader() -> impl AppLoader {
    || Err::<TestApp, _>("database unreachable")
}

/// Loader that fails only on its `nth` call (1-based), counting every call.
pub fn flaky_loader(nth: usize) -> (impl AppLoader, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let loader = move || {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == nth {
            Err("cache warmup failed")
        } else {
            Ok(TestApp::default())
        }
    };
    (loader, loads)
}

pub struct RunningLauncher {
    pub handle: LauncherHandle,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), LauncherError>>,
    pub addr: SocketAddr,
}

impl RunningLauncher {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger a graceful stop and return the launcher's result.
    pub async fn stop(self) -> Result<(), LauncherError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("launcher did not stop")
            .unwrap()
    }
}

pub fn launch(config: ProcessConfiguration, loader: impl AppLoader) -> RunningLauncher {
    let addr = config.bind_address();
    let shutdown = Shutdown::new();
    let launcher = Launcher::new(Arc::new(config), loader);
    let handle = launcher.handle();
    let task = tokio::spawn(launcher.run(shutdown.subscribe()));
    RunningLauncher {
        handle,
        shutdown,
        task,
        addr,
    }
}

pub async fn wait_for(
    handle: &LauncherHandle,
    predicate: impl FnMut(&FleetStatus) -> bool,
) -> FleetStatus {
    tokio::time::timeout(Duration::from_secs(10), handle.wait_for(predicate))
        .await
        .expect("timed out waiting for fleet status")
        .expect("launcher stopped while waiting")
}

pub async fn wait_running(handle: &LauncherHandle) -> FleetStatus {
    wait_for(handle, |status| status.state == LifecycleState::Running).await
}

/// Fresh connection per request so the kernel can pick any worker.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap()
}

pub fn served_by(response: &reqwest::Response) -> WorkerPid {
    let raw: u64 = response
        .headers()
        .get(X_WORKER_ID.as_str())
        .expect("missing worker header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    WorkerPid::from(raw)
}
