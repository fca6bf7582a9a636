//! Topology resolution.
//!
//! # Responsibilities
//! - Read the externally supplied `PORT`
//! - Merge it with the validated file/default configuration
//! - Produce the immutable [`ProcessConfiguration`] every subsystem reads
//!
//! # Design Decisions
//! - Missing or malformed `PORT` is fatal; never fall back to a default port
//! - Port 0 is rejected (an ephemeral port is a misconfiguration in production)
//! - Resolution opens no sockets

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono_tz::Tz;

use crate::config::loader::ConfigError;
use crate::config::schema::{CrashLoopConfig, LauncherConfig, ObservabilityConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::environment::timezone::parse_zone;

/// Environment variable carrying the listening port.
pub const PORT_VAR: &str = "PORT";

/// Source of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Fully resolved, immutable process configuration.
#[derive(Debug, Clone)]
pub struct ProcessConfiguration {
    timezone: Tz,
    bind_address: SocketAddr,
    worker_count: usize,
    threads_per_worker: usize,
    request_timeout: Duration,
    preload_enabled: bool,
    graceful_timeout: Duration,
    cancel_grace: Duration,
    crash_loop: CrashLoopConfig,
    observability: ObservabilityConfig,
    metrics_address: Option<SocketAddr>,
}

impl ProcessConfiguration {
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn threads_per_worker(&self) -> usize {
        self.threads_per_worker
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn preload_enabled(&self) -> bool {
        self.preload_enabled
    }

    pub fn graceful_timeout(&self) -> Duration {
        self.graceful_timeout
    }

    pub fn cancel_grace(&self) -> Duration {
        self.cancel_grace
    }

    pub fn crash_loop(&self) -> &CrashLoopConfig {
        &self.crash_loop
    }

    pub fn observability(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// Prometheus listener address, present only when metrics are enabled.
    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.metrics_address
    }

    /// Upper bound on concurrently handled requests across the fleet.
    pub fn max_in_flight(&self) -> usize {
        self.worker_count * self.threads_per_worker
    }
}

impl fmt::Display for ProcessConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "timezone          = {}", self.timezone.name())?;
        writeln!(f, "bind_address      = {}", self.bind_address)?;
        writeln!(f, "workers           = {}", self.worker_count)?;
        writeln!(f, "threads           = {}", self.threads_per_worker)?;
        writeln!(f, "max_in_flight     = {}", self.max_in_flight())?;
        writeln!(f, "request_timeout   = {}s", self.request_timeout.as_secs())?;
        writeln!(f, "graceful_timeout  = {}s", self.graceful_timeout.as_secs())?;
        writeln!(f, "cancel_grace      = {}ms", self.cancel_grace.as_millis())?;
        writeln!(f, "preload           = {}", self.preload_enabled)?;
        match self.metrics_address {
            Some(addr) => write!(f, "metrics           = {}", addr),
            None => write!(f, "metrics           = disabled"),
        }
    }
}

/// Read and validate `PORT` from `env`.
pub fn port_from_env(env: &impl EnvSource) -> Result<u16, ConfigError> {
    let raw = env.var(PORT_VAR).ok_or(ConfigError::MissingPort)?;
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(raw)),
    }
}

/// Resolve the process configuration from file/default settings and the
/// environment.
pub fn resolve(
    config: &LauncherConfig,
    env: &impl EnvSource,
) -> Result<ProcessConfiguration, ConfigError> {
    let port = port_from_env(env)?;
    validate_config(config).map_err(ConfigError::Validation)?;

    let timezone = parse_zone(&config.timezone)?;
    let host: IpAddr = config.listener.host.parse().map_err(|_| {
        ConfigError::Validation(vec![ValidationError::new(
            "listener.host",
            format!("'{}' is not an IP address", config.listener.host),
        )])
    })?;

    let metrics_address = if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse().map_err(|_| {
            ConfigError::Validation(vec![ValidationError::new(
                "observability.metrics_address",
                format!(
                    "'{}' is not a socket address",
                    config.observability.metrics_address
                ),
            )])
        })?;
        Some(addr)
    } else {
        None
    };

    Ok(ProcessConfiguration {
        timezone,
        bind_address: SocketAddr::new(host, port),
        worker_count: config.workers.count,
        threads_per_worker: config.workers.threads,
        request_timeout: Duration::from_secs(config.timeouts.request_secs),
        preload_enabled: config.preload,
        graceful_timeout: Duration::from_secs(config.timeouts.graceful_secs),
        cancel_grace: Duration::from_millis(config.timeouts.cancel_grace_ms),
        crash_loop: config.crash_loop.clone(),
        observability: config.observability.clone(),
        metrics_address,
    })
}
