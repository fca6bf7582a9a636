//! Respawn backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::CrashLoopConfig;

/// Delay before replacing a worker when `recent_failures` (this one
/// included) sit in the crash-loop window.
///
/// The first failure is replaced at once. Each further failure doubles the
/// delay from `backoff_base_ms` up to `backoff_max_ms`, plus up to 10%
/// jitter so slots failing together do not restart in lockstep.
pub fn respawn_delay(policy: &CrashLoopConfig, recent_failures: usize) -> Duration {
    let Some(doublings) = recent_failures.checked_sub(2) else {
        return Duration::ZERO;
    };

    let base = Duration::from_millis(policy.backoff_base_ms);
    let cap = Duration::from_millis(policy.backoff_max_ms);
    let factor = 1u32 << doublings.min(31);
    let delay = base.saturating_mul(factor).min(cap);

    delay + jitter(delay)
}

fn jitter(delay: Duration) -> Duration {
    let spread_ms = (delay.as_millis() / 10) as u64;
    if spread_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..spread_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> CrashLoopConfig {
        CrashLoopConfig {
            backoff_base_ms: base_ms,
            backoff_max_ms: max_ms,
            ..CrashLoopConfig::default()
        }
    }

    fn within_jitter(delay: Duration, expected_ms: u64) -> bool {
        delay >= Duration::from_millis(expected_ms)
            && delay < Duration::from_millis(expected_ms + expected_ms / 10 + 1)
    }

    #[test]
    fn first_failure_is_replaced_immediately() {
        assert_eq!(respawn_delay(&policy(100, 5000), 1), Duration::ZERO);
        assert_eq!(respawn_delay(&policy(100, 5000), 0), Duration::ZERO);
    }

    #[test]
    fn doubles_per_failure() {
        let policy = policy(100, 5000);
        assert!(within_jitter(respawn_delay(&policy, 2), 100));
        assert!(within_jitter(respawn_delay(&policy, 3), 200));
        assert!(within_jitter(respawn_delay(&policy, 4), 400));
    }

    #[test]
    fn capped_at_policy_max() {
        let policy = policy(100, 1000);
        assert!(within_jitter(respawn_delay(&policy, 10), 1000));
        assert!(within_jitter(respawn_delay(&policy, usize::MAX), 1000));
    }

    #[test]
    fn zero_base_never_waits() {
        assert_eq!(respawn_delay(&policy(0, 1000), 5), Duration::ZERO);
    }
}
