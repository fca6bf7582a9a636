//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (counts > 0, timeouts > 0, host parses)
//! - Validate the timezone against the IANA database
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LauncherConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::LauncherConfig;
use crate::environment::timezone::parse_zone;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate every field of `config`.
pub fn validate_config(config: &LauncherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = parse_zone(&config.timezone) {
        errors.push(ValidationError::new("timezone", e.to_string()));
    }

    if config.listener.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.host",
            format!("'{}' is not an IP address", config.listener.host),
        ));
    }

    if config.workers.count == 0 {
        errors.push(ValidationError::new("workers.count", "must be at least 1"));
    }
    if config.workers.threads == 0 {
        errors.push(ValidationError::new("workers.threads", "must be at least 1"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be at least 1"));
    }
    if config.timeouts.graceful_secs == 0 {
        errors.push(ValidationError::new("timeouts.graceful_secs", "must be at least 1"));
    }

    let crash_loop = &config.crash_loop;
    if crash_loop.window_secs == 0 {
        errors.push(ValidationError::new("crash_loop.window_secs", "must be at least 1"));
    }
    if crash_loop.backoff_max_ms < crash_loop.backoff_base_ms {
        errors.push(ValidationError::new(
            "crash_loop.backoff_max_ms",
            "must not be smaller than backoff_base_ms",
        ));
    }

    let observability = &config.observability;
    if !matches!(
        observability.log_level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&LauncherConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = LauncherConfig::default();
        config.timezone = "Nowhere/Special".into();
        config.workers.count = 0;
        config.workers.threads = 0;
        config.timeouts.request_secs = 0;
        config.listener.host = "localhost:80".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "timezone",
                "listener.host",
                "workers.count",
                "workers.threads",
                "timeouts.request_secs",
            ]
        );
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = LauncherConfig::default();
        config.observability.metrics_address = "not an address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
