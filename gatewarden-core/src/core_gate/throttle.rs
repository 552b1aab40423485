//! Per-identity spam throttle with penalty escalation
//!
//! Backed by durable [`ThrottleState`] counters; the in-memory map is
//! authoritative and persisted wholesale by the service after mutations.

use super::types::{Timestamp, UserId};
use crate::core_store::records::ThrottleState;
use std::collections::HashMap;
use std::time::Duration;

/// Result of a throttle check, surfaced verbatim to the user on block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleVerdict {
    pub blocked: bool,
    pub remaining_secs: u64,
}

impl ThrottleVerdict {
    fn clear() -> Self {
        Self {
            blocked: false,
            remaining_secs: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct SpamThrottle {
    entries: HashMap<UserId, ThrottleState>,
}

impl SpamThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore state loaded from the durable store.
    pub fn from_entries(entries: HashMap<UserId, ThrottleState>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &HashMap<UserId, ThrottleState> {
        &self.entries
    }

    /// Every command-class entry point consults this first.
    pub fn check(&self, user: UserId, now: Timestamp) -> ThrottleVerdict {
        match self.entries.get(&user).and_then(|state| state.expires_at) {
            Some(deadline) if !deadline.is_past(now) => {
                // Ceiling, so the user is never told 0 while still blocked.
                let remaining_ms = deadline.as_millis() - now.as_millis();
                ThrottleVerdict {
                    blocked: true,
                    remaining_secs: remaining_ms.div_ceil(1_000),
                }
            }
            _ => ThrottleVerdict::clear(),
        }
    }

    /// Apply a penalty: bump the violation count and push the deadline out.
    pub fn penalize(&mut self, user: UserId, duration: Duration, now: Timestamp) {
        let state = self.entries.entry(user).or_default();
        state.violations += 1;
        state.expires_at = Some(now.saturating_add(duration));
        state.last_penalty = Some(now);
        metrics::counter!("gate.throttle.penalties").increment(1);
    }

    /// Count a forwarded support message; returns the updated count.
    pub fn bump_support_count(&mut self, user: UserId) -> u32 {
        let state = self.entries.entry(user).or_default();
        state.support_count += 1;
        state.support_count
    }

    /// Support messages sent so far in the current window.
    pub fn support_count(&self, user: UserId) -> u32 {
        self.entries
            .get(&user)
            .map(|state| state.support_count)
            .unwrap_or(0)
    }

    /// Drop entries whose penalty deadline has passed. Returns `true` when
    /// something was removed so the caller can skip a redundant persist.
    pub fn sweep(&mut self, now: Timestamp) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, state| !state.is_expired(now));
        self.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(7);

    #[test]
    fn test_unknown_user_is_not_blocked() {
        let throttle = SpamThrottle::new();
        assert_eq!(
            throttle.check(USER, Timestamp::from_millis(0)),
            ThrottleVerdict::clear()
        );
    }

    #[test]
    fn test_penalty_blocks_until_deadline() {
        let mut throttle = SpamThrottle::new();
        let now = Timestamp::from_millis(10_000);
        throttle.penalize(USER, Duration::from_secs(120), now);

        let verdict = throttle.check(USER, now);
        assert!(verdict.blocked);
        assert_eq!(verdict.remaining_secs, 120);

        let at_deadline = now.saturating_add(Duration::from_secs(120));
        assert!(!throttle.check(USER, at_deadline).blocked);
    }

    #[test]
    fn test_remaining_time_strictly_decreases_to_zero() {
        let mut throttle = SpamThrottle::new();
        let now = Timestamp::from_millis(0);
        throttle.penalize(USER, Duration::from_secs(10), now);

        let mut last = u64::MAX;
        for secs in 0..10 {
            let verdict = throttle.check(USER, Timestamp::from_millis(secs * 1_000 + 1));
            assert!(verdict.blocked);
            assert!(verdict.remaining_secs < last);
            last = verdict.remaining_secs;
        }
        let done = throttle.check(USER, Timestamp::from_millis(10_000));
        assert!(!done.blocked);
        assert_eq!(done.remaining_secs, 0);
    }

    #[test]
    fn test_repeat_penalties_escalate_violations() {
        let mut throttle = SpamThrottle::new();
        let now = Timestamp::from_millis(0);
        throttle.penalize(USER, Duration::from_secs(60), now);
        throttle.penalize(USER, Duration::from_secs(600), now);
        assert_eq!(throttle.entries()[&USER].violations, 2);
    }

    #[test]
    fn test_support_count_survives_without_penalty() {
        let mut throttle = SpamThrottle::new();
        assert_eq!(throttle.bump_support_count(USER), 1);
        assert_eq!(throttle.bump_support_count(USER), 2);

        // No deadline set: sweep must not touch the counting entry.
        assert!(!throttle.sweep(Timestamp::from_millis(u64::MAX / 2)));
        assert_eq!(throttle.support_count(USER), 2);
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let mut throttle = SpamThrottle::new();
        let now = Timestamp::from_millis(0);
        throttle.penalize(UserId(1), Duration::from_secs(10), now);
        throttle.penalize(UserId(2), Duration::from_secs(1_000), now);

        let changed = throttle.sweep(Timestamp::from_millis(11_000));
        assert!(changed);
        assert!(!throttle.entries().contains_key(&UserId(1)));
        assert!(throttle.entries().contains_key(&UserId(2)));

        // Nothing left to drop: sweep reports no change.
        assert!(!throttle.sweep(Timestamp::from_millis(12_000)));
    }
}
