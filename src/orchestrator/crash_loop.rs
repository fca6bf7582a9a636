//! Crash-loop detection.
//!
//! Worker failures (load failures and crashes) are counted in a sliding window shared by the
//! whole fleet. Each failure gets a respawn delay from the backoff curve, so the
//! first replacement is immediate and a worker that keeps dying slows down.
//! Exceeding `max_restarts` inside the window means restarting is not
//! helping; the master stops the fleet and surfaces the failure.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::CrashLoopConfig;
use crate::resilience::backoff::respawn_delay;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartDecision {
    Respawn { delay: Duration },
    GiveUp { exits: usize, window: Duration },
}

#[derive(Debug)]
pub struct CrashLoopDetector {
    policy: CrashLoopConfig,
    window: Duration,
    exits: VecDeque<Instant>,
}

impl CrashLoopDetector {
    pub fn new(config: &CrashLoopConfig) -> Self {
        Self {
            policy: config.clone(),
            window: Duration::from_secs(config.window_secs),
            exits: VecDeque::new(),
        }
    }

    /// Record an unexpected exit at `now` and decide what to do.
    pub fn record_exit(&mut self, now: Instant) -> RestartDecision {
        while let Some(&oldest) = self.exits.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.exits.pop_front();
            } else {
                break;
            }
        }
        self.exits.push_back(now);

        let recent = self.exits.len();
        if recent > self.policy.max_restarts as usize {
            return RestartDecision::GiveUp {
                exits: recent,
                window: self.window,
            };
        }

        RestartDecision::Respawn {
            delay: respawn_delay(&self.policy, recent),
        }
    }

    /// Exits currently inside the window.
    pub fn recent_exits(&self) -> usize {
        self.exits.len()
    }
}
