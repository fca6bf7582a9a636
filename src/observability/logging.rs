//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Render every timestamp in the configured process timezone
//! - Configure log level from config, overridable through `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Installed once, after the timezone and before anything else logs

use chrono_tz::Tz;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::environment::ZonedTimer;

/// Build the filter: `RUST_LOG` wins, then the configured level.
pub fn build_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_ascii_lowercase()))
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig, zone: Tz) -> Result<(), TryInitError> {
    let timer = ZonedTimer::new(zone);

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (
            Some(tracing_subscriber::fmt::layer().with_timer(timer)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_timer(timer),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(pretty)
        .with(json)
        .try_init()
}
