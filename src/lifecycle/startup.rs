//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the config file and install the process timezone
//! - Initialize logging once timestamps can render in that zone
//! - Resolve the topology from the environment
//! - Start metrics, signal handling and the master
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and maps to an exit code
//! - Timezone first, logging second, everything else after
//! - No socket is opened before configuration is fully valid

use std::path::Path;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

use crate::app::{AppLoadError, AppLoader};
use crate::config::{loader, topology, ConfigError, EnvSource, LauncherConfig, ProcessConfiguration};
use crate::environment::timezone;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::net::ListenerError;
use crate::observability::{logging, metrics};
use crate::orchestrator::Launcher;

/// Exit code for configuration errors.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for application load failures.
pub const EXIT_LOAD: u8 = 3;
/// Exit code when the crash-loop policy gives up.
pub const EXIT_CRASH_LOOP: u8 = 4;

/// Fatal launcher errors.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("application failed to load: {0}")]
    Load(#[from] AppLoadError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("crash loop: {exits} unexpected worker exits within {window_secs}s")]
    CrashLoop { exits: usize, window_secs: u64 },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] TryInitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LauncherError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            LauncherError::Config(_) => EXIT_CONFIG,
            LauncherError::Load(_) => EXIT_LOAD,
            LauncherError::CrashLoop { .. } => EXIT_CRASH_LOOP,
            LauncherError::Listener(_)
            | LauncherError::Metrics(_)
            | LauncherError::Logging(_)
            | LauncherError::Io(_) => 1,
        }
    }
}

/// Load the config file, install the timezone and start logging.
///
/// Nothing may log before this returns; errors are for the caller to print.
pub fn bootstrap(config_path: Option<&Path>) -> Result<LauncherConfig, LauncherError> {
    let config = loader::load_or_default(config_path)?;

    let zone = timezone::parse_zone(&config.timezone).map_err(ConfigError::from)?;
    timezone::configure(zone).map_err(ConfigError::from)?;

    logging::init_logging(&config.observability, zone)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        timezone = zone.name(),
        config_file = ?config_path,
        "prefork-launcher starting"
    );
    Ok(config)
}

/// Resolve and log the process configuration.
pub fn resolve_topology(
    config: &LauncherConfig,
    env: &impl EnvSource,
) -> Result<ProcessConfiguration, LauncherError> {
    let resolved = topology::resolve(config, env)?;

    tracing::info!(
        bind_address = %resolved.bind_address(),
        workers = resolved.worker_count(),
        threads_per_worker = resolved.threads_per_worker(),
        max_in_flight = resolved.max_in_flight(),
        request_timeout_secs = resolved.request_timeout().as_secs(),
        preload = resolved.preload_enabled(),
        "Configuration loaded"
    );
    Ok(resolved)
}

/// Run the fleet until `shutdown` stops it or it fails.
///
/// Installs the metrics exporter when enabled (failing to start it is
/// fatal) and forwards OS signals to `shutdown`. Must be called from within
/// a Tokio runtime.
pub async fn run<L: AppLoader>(
    config: ProcessConfiguration,
    loader: L,
    shutdown: Shutdown,
) -> Result<(), LauncherError> {
    if let Some(addr) = config.metrics_address() {
        metrics::init_metrics(addr)?;
    }

    let receiver = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signals::listen(signal_shutdown).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    let launcher = Launcher::new(Arc::new(config), loader);
    launcher.run(receiver).await
}
