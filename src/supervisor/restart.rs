//! Crash accounting for the daemon: failure windows, backoff and the
//! give-up decision.

use super::RestartPolicy;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Exponential backoff with jitter.
///
/// The first failure waits `base`, each further one doubles it, capped at
/// `max`. Jitter of +/-50% keeps several crashing servers from restarting in
/// lockstep. A zero `base` disables backoff entirely.
pub fn calculate_backoff_delay(consecutive_failures: u32, base: Duration, max: Duration) -> Duration {
    if consecutive_failures == 0 || base.is_zero() {
        return Duration::ZERO;
    }

    let exponent = consecutive_failures.saturating_sub(1).min(16);
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

    let jitter = delay_ms / 2;
    let min_delay = delay_ms.saturating_sub(jitter);
    let max_delay = delay_ms.saturating_add(jitter);
    let with_jitter = if min_delay < max_delay {
        rand::thread_rng().gen_range(min_delay..=max_delay)
    } else {
        delay_ms
    };

    Duration::from_millis(with_jitter)
}

/// `failures` is 1-indexed: with `max_restarts = 3`, failures 1 to 3 are
/// restarted and the 4th is not.
pub fn should_restart(max_restarts: u32, failures: u32) -> bool {
    failures <= max_restarts
}

/// What the daemon should do after observing a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashDecision {
    RestartNow { failures: u32 },
    RestartAt { failures: u32, at: Instant },
    GiveUp { failures: u32 },
}

#[derive(Debug, Default)]
struct Entry {
    failures: VecDeque<Instant>,
    retry_at: Option<Instant>,
    last_error: Option<String>,
}

/// Per-name crash history, owned by the daemon loop.
#[derive(Debug, Default)]
pub struct RestartTracker {
    policy: RestartPolicy,
    entries: HashMap<String, Entry>,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    /// Record a crash observed at `now` and decide what to do about it.
    pub fn on_crash(&mut self, name: &str, now: Instant, error: Option<String>) -> CrashDecision {
        let window = self.policy.window;
        let entry = self.entries.entry(name.to_string()).or_default();
        while let Some(first) = entry.failures.front() {
            if now.duration_since(*first) > window {
                entry.failures.pop_front();
            } else {
                break;
            }
        }
        entry.failures.push_back(now);
        if error.is_some() {
            entry.last_error = error;
        }
        let failures = entry.failures.len() as u32;

        if !should_restart(self.policy.max_restarts, failures) {
            entry.retry_at = None;
            return CrashDecision::GiveUp { failures };
        }

        let delay = calculate_backoff_delay(failures, self.policy.backoff, self.policy.max_backoff);
        if delay.is_zero() {
            entry.retry_at = None;
            CrashDecision::RestartNow { failures }
        } else {
            let at = now + delay;
            entry.retry_at = Some(at);
            CrashDecision::RestartAt { failures, at }
        }
    }

    /// Pending retry time for `name`, if a restart is scheduled.
    pub fn retry_at(&self, name: &str) -> Option<Instant> {
        self.entries.get(name).and_then(|e| e.retry_at)
    }

    pub fn schedule_retry(&mut self, name: &str, at: Instant) {
        self.entries.entry(name.to_string()).or_default().retry_at = Some(at);
    }

    pub fn clear_retry(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.retry_at = None;
        }
    }

    pub fn failures(&self, name: &str) -> u32 {
        self.entries.get(name).map_or(0, |e| e.failures.len() as u32)
    }

    pub fn last_error(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(|e| e.last_error.as_deref())
    }

    /// Forget the history of a server that has stayed up for a full window.
    pub fn reset(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn window(&self) -> Duration {
        self.policy.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_restarts: u32, backoff: Duration) -> RestartPolicy {
        RestartPolicy {
            max_restarts,
            window: Duration::from_secs(300),
            backoff,
            max_backoff: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_should_restart_with_limit() {
        assert!(should_restart(3, 1));
        assert!(should_restart(3, 3));
        assert!(!should_restart(3, 4));
        assert!(!should_restart(0, 1));
    }

    #[test]
    fn test_calculate_backoff_zero() {
        assert_eq!(
            calculate_backoff_delay(0, Duration::from_secs(1), Duration::from_secs(60)),
            Duration::ZERO
        );
        assert_eq!(
            calculate_backoff_delay(5, Duration::ZERO, Duration::from_secs(60)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        for _ in 0..10 {
            let d1 = calculate_backoff_delay(1, base, max);
            assert!(d1 >= Duration::from_millis(500) && d1 <= Duration::from_millis(1500));

            let d3 = calculate_backoff_delay(3, base, max);
            assert!(d3 >= Duration::from_secs(2) && d3 <= Duration::from_secs(6));
        }
    }

    #[test]
    fn test_calculate_backoff_capped() {
        for _ in 0..10 {
            let d = calculate_backoff_delay(30, Duration::from_secs(1), Duration::from_secs(60));
            assert!(d >= Duration::from_secs(30) && d <= Duration::from_secs(90));
        }
    }

    #[test]
    fn gives_up_after_max_restarts() {
        let mut tracker = RestartTracker::new(policy(2, Duration::ZERO));
        let now = Instant::now();
        assert_eq!(
            tracker.on_crash("a", now, None),
            CrashDecision::RestartNow { failures: 1 }
        );
        assert_eq!(
            tracker.on_crash("a", now, None),
            CrashDecision::RestartNow { failures: 2 }
        );
        assert_eq!(
            tracker.on_crash("a", now, Some("exit 1".into())),
            CrashDecision::GiveUp { failures: 3 }
        );
        assert_eq!(tracker.last_error("a"), Some("exit 1"));
        assert_eq!(tracker.failures("b"), 0);
    }

    #[test]
    fn old_failures_fall_out_of_window() {
        let mut tracker = RestartTracker::new(RestartPolicy {
            window: Duration::from_secs(10),
            ..policy(1, Duration::ZERO)
        });
        let start = Instant::now();
        tracker.on_crash("a", start, None);
        let later = start + Duration::from_secs(11);
        assert_eq!(
            tracker.on_crash("a", later, None),
            CrashDecision::RestartNow { failures: 1 }
        );
    }

    #[test]
    fn backoff_schedules_retry() {
        let mut tracker = RestartTracker::new(policy(5, Duration::from_secs(1)));
        let now = Instant::now();
        match tracker.on_crash("a", now, None) {
            CrashDecision::RestartAt { failures: 1, at } => {
                assert!(at > now);
                assert_eq!(tracker.retry_at("a"), Some(at));
            }
            other => panic!("unexpected decision {:?}", other),
        }
        tracker.clear_retry("a");
        assert!(tracker.retry_at("a").is_none());
        tracker.reset("a");
        assert_eq!(tracker.failures("a"), 0);
    }
}
