//! Built-in status application served by the launcher binary.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::app::{AppLoadError, Application};
use crate::environment::timezone;
use crate::worker::{WorkerContext, WorkerPid};

/// Minimal application: banner, health and zoned clock.
#[derive(Debug)]
pub struct StatusApp {
    booted_at: DateTime<Tz>,
}

impl StatusApp {
    pub fn load() -> Result<Self, AppLoadError> {
        Ok(Self {
            booted_at: timezone::now(),
        })
    }
}

#[derive(Clone)]
struct StatusState {
    app: Arc<StatusApp>,
    worker: WorkerPid,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    worker: String,
    timezone: &'static str,
    booted_at: String,
    now: String,
}

impl Application for StatusApp {
    fn router(self: Arc<Self>, worker: &WorkerContext) -> Router {
        Router::new()
            .route("/", get(banner))
            .route("/healthz", get(healthz))
            .route("/time", get(time))
            .with_state(StatusState {
                app: self,
                worker: worker.pid,
            })
    }
}

async fn banner(State(state): State<StatusState>) -> String {
    format!(
        "prefork-launcher {} served by {}\n",
        env!("CARGO_PKG_VERSION"),
        state.worker
    )
}

async fn healthz(State(state): State<StatusState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        worker: state.worker.to_string(),
        timezone: timezone::active().name(),
        booted_at: state.app.booted_at.to_rfc3339(),
        now: timezone::now().to_rfc3339(),
    })
}

async fn time() -> String {
    timezone::now().to_rfc3339()
}
