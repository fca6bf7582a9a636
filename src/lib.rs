//! Pre-fork process launcher for web applications.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   MASTER                      │
//!                        │                                               │
//!   config file + PORT   │  ┌────────┐   ┌─────────────┐   ┌──────────┐  │
//!   ─────────────────────┼─▶│ config │──▶│ environment │──▶│orchestr- │  │
//!                        │  │topology│   │  timezone   │   │  ator    │  │
//!                        │  └────────┘   └─────────────┘   └────┬─────┘  │
//!                        │        preload app once (app) ───────┤        │
//!                        │        bind shared socket (net) ─────┤        │
//!                        └──────────────────────────────────────┼────────┘
//!                                           ┌───────────────────┼───────────────┐
//!                                           ▼                   ▼               ▼
//!                                      ┌─────────┐         ┌─────────┐     ┌─────────┐
//!   Client ───── kernel accept ──────▶ │worker 0 │         │worker 1 │ ... │worker N │
//!                                      │ runtime │         │ runtime │     │ runtime │
//!                                      │ + guard │         │ + guard │     │ + guard │
//!                                      └─────────┘         └─────────┘     └─────────┘
//! ```
//!
//! Cross-cutting: `lifecycle` (startup, signals, shutdown), `observability`
//! (logging, metrics), `resilience` (respawn backoff).

pub mod app;
pub mod config;
pub mod environment;
pub mod guard;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod orchestrator;
pub mod resilience;
pub mod worker;

pub use app::{AppLoadError, AppLoader, Application, StatusApp};
pub use config::{LauncherConfig, ProcessConfiguration};
pub use lifecycle::{LauncherError, Shutdown, ShutdownKind};
pub use orchestrator::{FleetStatus, Launcher, LauncherHandle, LifecycleState};
pub use worker::{WorkerContext, WorkerPid};
