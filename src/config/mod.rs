//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → topology.rs (+ PORT from the environment)
//!     → ProcessConfiguration (validated, immutable)
//!     → shared via Arc to the orchestrator and every worker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod topology;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    CrashLoopConfig, LauncherConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    TimeoutConfig, WorkerConfig,
};
pub use topology::{resolve, EnvSource, ProcessConfiguration, ProcessEnv, PORT_VAR};
