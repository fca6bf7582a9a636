//! Process timezone configuration.
//!
//! # Responsibilities
//! - Resolve an IANA zone identifier
//! - Install the zone process-wide exactly once
//! - Export `TZ` so libc and `chrono::Local` render in the same zone
//! - Provide zoned clocks for logging and applications

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Zone used when nothing else is configured.
pub const DEFAULT_TIMEZONE: &str = "Asia/Taipei";

static ACTIVE_ZONE: OnceLock<Tz> = OnceLock::new();

/// Errors raised while configuring the process timezone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimezoneError {
    /// Zone identifier is not in the IANA database.
    #[error("unknown timezone '{0}'")]
    Unknown(String),

    /// A different zone was installed earlier in this process.
    #[error("timezone already configured as {active}, refusing to switch to {requested}")]
    AlreadyConfigured { active: String, requested: String },
}

/// Parse an IANA zone identifier.
pub fn parse_zone(id: &str) -> Result<Tz, TimezoneError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(TimezoneError::Unknown(id.to_string()));
    }
    trimmed
        .parse::<Tz>()
        .map_err(|_| TimezoneError::Unknown(id.to_string()))
}

/// Install `zone` as the process timezone.
///
/// Must run before any worker is started. Calling it again with the same
/// zone is a no-op; a different zone is rejected.
pub fn configure(zone: Tz) -> Result<Tz, TimezoneError> {
    let active = *ACTIVE_ZONE.get_or_init(|| {
        std::env::set_var("TZ", zone.name());
        zone
    });

    if active != zone {
        return Err(TimezoneError::AlreadyConfigured {
            active: active.name().to_string(),
            requested: zone.name().to_string(),
        });
    }

    Ok(active)
}

/// The installed zone, or UTC if [`configure`] has not run yet.
pub fn active() -> Tz {
    ACTIVE_ZONE.get().copied().unwrap_or(Tz::UTC)
}

/// Current wall-clock time in the active zone.
pub fn now() -> DateTime<Tz> {
    Utc::now().with_timezone(&active())
}

/// Render `instant` in `zone` as RFC 3339 with the zone offset.
pub fn render(instant: DateTime<Utc>, zone: Tz) -> String {
    instant.with_timezone(&zone).to_rfc3339()
}

/// Log timestamp formatter pinned to one zone.
#[derive(Debug, Clone, Copy)]
pub struct ZonedTimer {
    zone: Tz,
}

impl ZonedTimer {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }
}

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.zone);
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.6f%:z"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_known_zone() {
        let zone = parse_zone("Asia/Taipei").unwrap();
        assert_eq!(zone.name(), "Asia/Taipei");
    }

    #[test]
    fn rejects_unknown_zone() {
        assert_eq!(
            parse_zone("Mars/Olympus_Mons"),
            Err(TimezoneError::Unknown("Mars/Olympus_Mons".into()))
        );
        assert!(parse_zone("").is_err());
    }

    #[test]
    fn known_instant_renders_with_taipei_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rendered = render(instant, parse_zone("Asia/Taipei").unwrap());
        assert_eq!(rendered, "2024-01-01T08:00:00+08:00");
    }

    #[test]
    fn configure_is_idempotent_and_sticky() {
        let taipei = parse_zone(DEFAULT_TIMEZONE).unwrap();
        assert_eq!(configure(taipei), Ok(taipei));
        assert_eq!(configure(taipei), Ok(taipei));
        assert_eq!(active(), taipei);
        assert_eq!(std::env::var("TZ").unwrap(), "Asia/Taipei");

        let err = configure(parse_zone("Europe/London").unwrap()).unwrap_err();
        assert!(matches!(err, TimezoneError::AlreadyConfigured { .. }));

        let offset = now().format("%:z").to_string();
        assert_eq!(offset, "+08:00");
    }
}
