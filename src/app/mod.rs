//! Application contract.
//!
//! # Data Flow
//! ```text
//! AppLoader::load()            (once in the master, or once per worker without preload)
//!     → Arc<App>               (read-only snapshot shared by every worker)
//!     → Application::router()  (inside each worker's runtime)
//!     → axum Router wrapped by the worker's guard layers
//! ```
//!
//! # Design Decisions
//! - The loaded application is immutable after load; workers only get `Arc`s
//! - Anything not safe to share (sockets, pools bound to a runtime) is
//!   created in `router()`, which runs per worker
//! - Closures returning `Result<App, E>` are loaders

pub mod status;

use std::fmt;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;

use crate::worker::WorkerContext;

pub use status::StatusApp;

/// The application failed to initialise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AppLoadError(String);

impl AppLoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// A loaded web application.
pub trait Application: Send + Sync + 'static {
    /// Build the router one worker serves.
    fn router(self: Arc<Self>, worker: &WorkerContext) -> Router;
}

/// Builds the application.
pub trait AppLoader: Send + Sync + 'static {
    type App: Application;

    fn load(&self) -> Result<Self::App, AppLoadError>;
}

impl<F, A, E> AppLoader for F
where
    F: Fn() -> Result<A, E> + Send + Sync + 'static,
    A: Application,
    E: fmt::Display,
{
    type App = A;

    fn load(&self) -> Result<A, AppLoadError> {
        self().map_err(|e| AppLoadError::new(e.to_string()))
    }
}
