//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the launcher.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file (or no file) is valid.

use serde::{Deserialize, Serialize};

use crate::environment::timezone::DEFAULT_TIMEZONE;

/// Root configuration for the launcher.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// IANA zone every timestamp renders in.
    pub timezone: String,

    /// Load the application once in the master before starting workers.
    pub preload: bool,

    /// Listener configuration (bind host; the port comes from `PORT`).
    pub listener: ListenerConfig,

    /// Worker topology.
    pub workers: WorkerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Respawn and crash-loop policy.
    pub crash_loop: CrashLoopConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            preload: true,
            listener: ListenerConfig::default(),
            workers: WorkerConfig::default(),
            timeouts: TimeoutConfig::default(),
            crash_loop: CrashLoopConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind on (all interfaces by default).
    pub host: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Worker topology.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker processes.
    pub count: usize,

    /// Request-handling threads per worker.
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            threads: 2,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wall-clock budget for a single request in seconds.
    pub request_secs: u64,

    /// Drain grace period on graceful shutdown in seconds.
    pub graceful_secs: u64,

    /// Time a cancelled handler has to yield before its worker is killed.
    pub cancel_grace_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            graceful_secs: 30,
            cancel_grace_ms: 2000,
        }
    }
}

/// Crash-loop policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrashLoopConfig {
    /// Unexpected exits tolerated inside one window.
    pub max_restarts: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,

    /// Base delay for respawn backoff in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum respawn delay in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for CrashLoopConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            window_secs: 60,
            backoff_base_ms: 100,
            backoff_max_ms: 5000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
