//! Master lifecycle state machine.
//!
//! # States
//! - Uninitialized: nothing loaded, nothing bound
//! - Loading: application loading in the master (preload only)
//! - Ready: application loaded, snapshot frozen
//! - Forking: socket bound, workers starting
//! - Running: every slot has a serving worker
//! - Draining: workers finishing in-flight requests
//! - Stopped: no workers left
//!
//! # State Transitions
//! ```text
//! Uninitialized → Loading → Ready → Forking → Running → Draining → Stopped
//! Uninitialized → Forking                    (preload disabled)
//! Loading | Ready → Stopped                  (load or bind failure)
//! Uninitialized → Stopped                   (bind failure, preload disabled)
//! Forking | Running → Stopped                (immediate kill, crash loop)
//! Forking → Draining                         (shutdown before all workers ready)
//! ```

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Loading,
    Ready,
    Forking,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid lifecycle transition {from} → {to}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Uninitialized, Loading)
                | (Uninitialized, Forking)
                | (Uninitialized, Stopped)
                | (Loading, Ready)
                | (Loading, Stopped)
                | (Ready, Forking)
                | (Ready, Stopped)
                | (Forking, Running)
                | (Forking, Draining)
                | (Forking, Stopped)
                | (Running, Draining)
                | (Running, Stopped)
                | (Draining, Stopped)
        )
    }

    /// Move to `next`, rejecting transitions the diagram does not allow.
    pub fn transition(&mut self, next: LifecycleState) -> Result<(), InvalidTransition> {
        if !self.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    /// Worker exits in this state are replaced.
    pub fn respawns_workers(self) -> bool {
        matches!(self, LifecycleState::Forking | LifecycleState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Loading => "loading",
            LifecycleState::Ready => "ready",
            LifecycleState::Forking => "forking",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
