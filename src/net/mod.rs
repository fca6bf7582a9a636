//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! master binds one listening socket (listener.rs)
//!     → duplicated once per worker
//!     → each worker registers its copy with its own runtime
//!     → kernel hands every incoming connection to exactly one worker
//! ```
//!
//! # Design Decisions
//! - Bound once, by the master, after configuration and preload succeed
//! - Non-blocking from the start so worker runtimes can adopt it
//! - The master keeps the original so respawned workers can get a copy

pub mod listener;

pub use listener::{ListenerError, SharedListener};
