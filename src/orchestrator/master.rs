//! The master: preload, bind, start workers, supervise, drain.
//!
//! # Responsibilities
//! - Load the application exactly once when preloading
//! - Bind the shared socket only after a successful load
//! - Keep `worker_count` workers alive, replacing unexpected exits
//! - Kill workers that hold a request past deadline plus grace
//! - Drain or kill the fleet on shutdown
//!
//! # Design Decisions
//! - A failed preload aborts before any socket or worker exists
//! - Worker exits during shutdown are expected and never replaced
//! - Only load failures and crashes count toward the crash-loop window;
//!   timeout and external kills are always replaced
//! - State is published on a watch channel; readers never block the master

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::app::{AppLoadError, AppLoader};
use crate::config::ProcessConfiguration;
use crate::guard::InFlightRegistry;
use crate::lifecycle::{LauncherError, ShutdownKind};
use crate::net::SharedListener;
use crate::observability::metrics;
use crate::orchestrator::crash_loop::{CrashLoopDetector, RestartDecision};
use crate::orchestrator::state::LifecycleState;
use crate::worker::runtime::{self, AppSource, WorkerSpec};
use crate::worker::{
    ExitReason, KillSwitch, WorkerContext, WorkerEvent, WorkerExit, WorkerInfo, WorkerPid,
    WorkerProcess,
};

/// How often the master sweeps for overdue requests and due respawns.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Extra time past deadline plus grace before the master steps in.
const SWEEP_SLACK: Duration = Duration::from_secs(1);

/// How long killed workers get to report their exit.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Snapshot of the fleet published by the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetStatus {
    pub state: LifecycleState,
    pub bind_address: Option<SocketAddr>,
    /// Live workers ordered by slot.
    pub workers: Vec<WorkerInfo>,
    pub spawned_total: u64,
    pub restarts_total: u64,
}

impl FleetStatus {
    fn initial() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            bind_address: None,
            workers: Vec::new(),
            spawned_total: 0,
            restarts_total: 0,
        }
    }

    pub fn ready_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.ready).count()
    }

    pub fn pids(&self) -> Vec<WorkerPid> {
        self.workers.iter().map(|w| w.pid).collect()
    }
}

#[derive(Debug)]
enum Control {
    TerminateWorker(WorkerPid),
}

/// Observe and poke a running launcher.
#[derive(Debug, Clone)]
pub struct LauncherHandle {
    status: watch::Receiver<FleetStatus>,
    control: mpsc::UnboundedSender<Control>,
}

impl LauncherHandle {
    /// Current fleet snapshot.
    pub fn status(&self) -> FleetStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<FleetStatus> {
        self.status.clone()
    }

    /// Kill one worker; the master replaces it in the same slot.
    pub fn terminate_worker(&self, pid: WorkerPid) -> bool {
        self.control.send(Control::TerminateWorker(pid)).is_ok()
    }

    /// Wait until `predicate` holds. `None` if the launcher finished first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&FleetStatus) -> bool,
    ) -> Option<FleetStatus> {
        let mut rx = self.status.clone();
        let status = rx.wait_for(|status| predicate(status)).await.ok()?;
        Some(status.clone())
    }
}

/// Pre-forking launcher for one application.
pub struct Launcher<L: AppLoader> {
    config: Arc<ProcessConfiguration>,
    loader: Arc<L>,
    status: watch::Sender<FleetStatus>,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl<L: AppLoader> Launcher<L> {
    pub fn new(config: Arc<ProcessConfiguration>, loader: L) -> Self {
        let (status, _) = watch::channel(FleetStatus::initial());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Self {
            config,
            loader: Arc::new(loader),
            status,
            control_tx,
            control_rx,
        }
    }

    pub fn handle(&self) -> LauncherHandle {
        LauncherHandle {
            status: self.status.subscribe(),
            control: self.control_tx.clone(),
        }
    }

    /// Preload, bind, start the fleet and supervise it until shutdown.
    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<ShutdownKind>,
    ) -> Result<(), LauncherError> {
        let Launcher {
            config,
            loader,
            status,
            control_tx,
            control_rx,
        } = self;
        let mut tracker = LifecycleTracker { state: LifecycleState::Uninitialized, status };

        let source = if config.preload_enabled() {
            preload(&loader, &mut tracker).await?
        } else {
            tracing::info!("Preload disabled, each worker loads the application");
            AppSource::Deferred(loader)
        };

        let listener = match SharedListener::bind(config.bind_address()) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "Failed to bind listener");
                tracker.enter(LifecycleState::Stopped);
                return Err(e.into());
            }
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        let mut fleet = Fleet {
            crash_loop: CrashLoopDetector::new(config.crash_loop()),
            config,
            source,
            listener,
            tracker,
            events_tx,
            events,
            control: control_rx,
            _control_tx: control_tx,
            workers: HashMap::new(),
            pending: Vec::new(),
            stopping: false,
            spawned_total: 0,
            restarts_total: 0,
        };

        fleet.start();
        let result = fleet.supervise(&mut shutdown).await;
        tracing::info!(
            spawned_total = fleet.spawned_total,
            restarts_total = fleet.restarts_total,
            "Fleet stopped"
        );
        result
    }
}

/// Load once in the master; the result becomes the shared snapshot.
async fn preload<L: AppLoader>(
    loader: &Arc<L>,
    tracker: &mut LifecycleTracker,
) -> Result<AppSource<L>, LauncherError> {
    tracker.enter(LifecycleState::Loading);
    tracing::info!("Preloading application in master");

    let started = Instant::now();
    let task_loader = Arc::clone(loader);
    let loaded = match tokio::task::spawn_blocking(move || task_loader.load()).await {
        Ok(result) => result,
        Err(e) => Err(AppLoadError::new(format!("loader panicked: {}", e))),
    };

    match loaded {
        Ok(app) => {
            tracker.enter(LifecycleState::Ready);
            tracing::info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Application loaded, snapshot frozen"
            );
            Ok(AppSource::Preloaded(Arc::new(app)))
        }
        Err(e) => {
            tracing::error!(error = %e, "Application failed to load, aborting launch");
            tracker.enter(LifecycleState::Stopped);
            Err(e.into())
        }
    }
}

/// Owns the lifecycle state and publishes it.
struct LifecycleTracker {
    state: LifecycleState,
    status: watch::Sender<FleetStatus>,
}

impl LifecycleTracker {
    fn enter(&mut self, next: LifecycleState) {
        if let Err(e) = self.state.transition(next) {
            tracing::warn!(error = %e, "Ignoring lifecycle transition");
            return;
        }
        tracing::info!(state = %next, "Lifecycle state changed");
        self.status.send_modify(|status| status.state = next);
    }
}

#[derive(Debug)]
struct PendingRespawn {
    slot: usize,
    due: Instant,
}

struct Fleet<L: AppLoader> {
    config: Arc<ProcessConfiguration>,
    source: AppSource<L>,
    listener: SharedListener,
    tracker: LifecycleTracker,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    // Keeps `control` open when no handle was taken.
    _control_tx: mpsc::UnboundedSender<Control>,
    workers: HashMap<WorkerPid, WorkerProcess>,
    pending: Vec<PendingRespawn>,
    crash_loop: CrashLoopDetector,
    stopping: bool,
    spawned_total: u64,
    restarts_total: u64,
}

impl<L: AppLoader> Fleet<L> {
    fn start(&mut self) {
        self.tracker.enter(LifecycleState::Forking);
        self.publish();

        for slot in 0..self.config.worker_count() {
            if let Err(e) = self.start_worker(slot) {
                tracing::error!(slot, error = %e, "Failed to start worker");
                self.pending.push(PendingRespawn {
                    slot,
                    due: Instant::now(),
                });
            }
        }
    }

    fn start_worker(&mut self, slot: usize) -> Result<(), LauncherError> {
        let listener = self.listener.handle_for_worker()?;
        let pid = WorkerPid::next();
        let kill = KillSwitch::new();
        let drain = CancellationToken::new();
        let inflight = InFlightRegistry::new();
        let threads = self.config.threads_per_worker();
        let preloaded = self.source.is_preloaded();

        runtime::spawn(WorkerSpec {
            context: WorkerContext { pid, slot },
            threads,
            request_timeout: self.config.request_timeout(),
            cancel_grace: self.config.cancel_grace(),
            source: self.source.clone(),
            listener,
            inflight: inflight.clone(),
            kill: kill.clone(),
            drain: drain.clone(),
            events: self.events_tx.clone(),
        })?;

        self.workers.insert(
            pid,
            WorkerProcess {
                pid,
                slot,
                thread_pool_size: threads,
                parent_loaded_state: preloaded,
                started_at: Instant::now(),
                ready: false,
                kill,
                drain,
                inflight,
            },
        );
        self.spawned_total += 1;
        metrics::record_worker_spawn(preloaded);
        tracing::info!(worker = %pid, slot, threads, preloaded, "Worker started");
        self.publish();
        Ok(())
    }

    async fn supervise(
        &mut self,
        shutdown: &mut broadcast::Receiver<ShutdownKind>,
    ) -> Result<(), LauncherError> {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outcome = tokio::select! {
                Some(event) = self.events.recv() => self.on_event(event),
                Some(control) = self.control.recv() => {
                    self.on_control(control);
                    Ok(())
                }
                _ = sweep.tick() => {
                    self.sweep_overdue();
                    self.spawn_due()
                }
                request = shutdown.recv() => match request {
                    Ok(kind) => return self.shutdown(kind, shutdown).await,
                    Err(RecvError::Lagged(_)) => Ok(()),
                    Err(RecvError::Closed) => {
                        return self.shutdown(ShutdownKind::Graceful, shutdown).await
                    }
                },
            };

            if let Err(e) = outcome {
                self.stopping = true;
                self.pending.clear();
                self.kill_all().await;
                self.tracker.enter(LifecycleState::Stopped);
                return Err(e);
            }
        }
    }

    fn on_event(&mut self, event: WorkerEvent) -> Result<(), LauncherError> {
        match event {
            WorkerEvent::Ready { pid } => {
                if let Some(worker) = self.workers.get_mut(&pid) {
                    worker.ready = true;
                }
                let ready = self.workers.values().filter(|w| w.ready).count();
                if self.tracker.state == LifecycleState::Forking
                    && ready == self.config.worker_count()
                {
                    self.tracker.enter(LifecycleState::Running);
                    tracing::info!(workers = ready, "All workers serving");
                }
                self.publish();
                Ok(())
            }
            WorkerEvent::Exited(exit) => self.on_exit(exit),
        }
    }

    fn on_exit(&mut self, exit: WorkerExit) -> Result<(), LauncherError> {
        if self.workers.remove(&exit.pid).is_none() {
            return Ok(());
        }
        metrics::record_worker_exit(exit.reason.label());
        self.publish();

        if self.stopping || !self.tracker.state.respawns_workers() {
            tracing::debug!(worker = %exit.pid, reason = %exit.reason, "Worker stopped");
            return Ok(());
        }

        tracing::warn!(
            worker = %exit.pid,
            slot = exit.slot,
            reason = %exit.reason,
            uptime_ms = exit.uptime.as_millis() as u64,
            "Worker exited unexpectedly"
        );
        if exit.reason.is_failure() {
            self.schedule_respawn(exit.slot)?;
        } else {
            // Kills are replaced at once and never escalate.
            self.restarts_total += 1;
            self.pending.push(PendingRespawn {
                slot: exit.slot,
                due: Instant::now(),
            });
        }
        self.spawn_due()
    }

    fn schedule_respawn(&mut self, slot: usize) -> Result<(), LauncherError> {
        match self.crash_loop.record_exit(Instant::now()) {
            RestartDecision::Respawn { delay } => {
                self.restarts_total += 1;
                if !delay.is_zero() {
                    tracing::info!(slot, delay_ms = delay.as_millis() as u64, "Delaying respawn");
                }
                self.pending.push(PendingRespawn {
                    slot,
                    due: Instant::now() + delay,
                });
                Ok(())
            }
            RestartDecision::GiveUp { exits, window } => {
                tracing::error!(
                    alert = "crash_loop",
                    exits,
                    window_secs = window.as_secs(),
                    "Workers keep exiting, stopping the fleet"
                );
                Err(LauncherError::CrashLoop {
                    exits,
                    window_secs: window.as_secs(),
                })
            }
        }
    }

    fn spawn_due(&mut self) -> Result<(), LauncherError> {
        if self.stopping || !self.tracker.state.respawns_workers() {
            self.pending.clear();
            return Ok(());
        }

        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|pending| pending.due <= now);
        self.pending = later;

        for pending in due {
            if let Err(e) = self.start_worker(pending.slot) {
                tracing::error!(slot = pending.slot, error = %e, "Failed to start worker");
                self.schedule_respawn(pending.slot)?;
            }
        }
        Ok(())
    }

    fn on_control(&mut self, control: Control) {
        match control {
            Control::TerminateWorker(pid) => match self.workers.get(&pid) {
                Some(worker) => {
                    tracing::info!(worker = %pid, "Terminating worker on request");
                    worker.kill.fire(ExitReason::Killed);
                }
                None => tracing::warn!(worker = %pid, "No such worker"),
            },
        }
    }

    /// Last-resort deadline enforcement for workers whose own guard did not fire.
    fn sweep_overdue(&self) {
        let slack = self.config.cancel_grace() + SWEEP_SLACK;
        let now = Instant::now();

        for worker in self.workers.values() {
            if worker.kill.is_fired() {
                continue;
            }
            if let Some(request) = worker.inflight.oldest_overdue(now, slack) {
                tracing::error!(
                    worker = %worker.pid,
                    request_id = %request.request_id,
                    in_flight = worker.in_flight(),
                    "Worker holds a request past its deadline, killing it"
                );
                worker.kill.fire(ExitReason::TimedOut {
                    request_id: request.request_id,
                });
            }
        }
    }

    async fn shutdown(
        &mut self,
        kind: ShutdownKind,
        shutdown: &mut broadcast::Receiver<ShutdownKind>,
    ) -> Result<(), LauncherError> {
        self.stopping = true;
        self.pending.clear();

        match kind {
            ShutdownKind::Graceful => self.drain(shutdown).await,
            ShutdownKind::Immediate => {
                tracing::warn!(workers = self.workers.len(), "Immediate shutdown, killing workers");
                self.kill_all().await;
            }
        }

        self.tracker.enter(LifecycleState::Stopped);
        self.publish();
        Ok(())
    }

    async fn drain(&mut self, shutdown: &mut broadcast::Receiver<ShutdownKind>) {
        self.tracker.enter(LifecycleState::Draining);
        let grace = self.config.graceful_timeout();
        tracing::info!(
            workers = self.workers.len(),
            grace_secs = grace.as_secs(),
            "Draining workers"
        );

        for worker in self.workers.values() {
            worker.drain.cancel();
        }

        let deadline = tokio::time::Instant::now() + grace;
        while !self.workers.is_empty() {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    let _ = self.on_event(event);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        remaining = self.workers.len(),
                        "Drain grace period elapsed, killing remaining workers"
                    );
                    self.kill_all().await;
                    return;
                }
                Ok(ShutdownKind::Immediate) = shutdown.recv() => {
                    tracing::warn!("Immediate shutdown requested while draining");
                    self.kill_all().await;
                    return;
                }
            }
        }
    }

    async fn kill_all(&mut self) {
        for worker in self.workers.values() {
            worker.kill.fire(ExitReason::Killed);
        }

        let deadline = tokio::time::Instant::now() + KILL_WAIT;
        while !self.workers.is_empty() {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => {
                    let _ = self.on_event(event);
                }
                _ => break,
            }
        }

        if !self.workers.is_empty() {
            tracing::warn!(
                remaining = self.workers.len(),
                "Workers did not report exit, abandoning them"
            );
            self.workers.clear();
        }
        self.publish();
    }

    fn publish(&self) {
        let mut workers: Vec<WorkerInfo> = self.workers.values().map(WorkerProcess::info).collect();
        workers.sort_by_key(|w| w.slot);
        metrics::record_workers_alive(workers.len());

        let snapshot = FleetStatus {
            state: self.tracker.state,
            bind_address: Some(self.listener.local_addr()),
            workers,
            spawned_total: self.spawned_total,
            restarts_total: self.restarts_total,
        };
        self.tracker.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
