//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, trace};

use super::backend::{AdmissionControl, RateLimitDecision};
use super::clock::{Clock, SystemClock};
use super::entry::WindowEntry;

/// Length of one fixed window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Requests admitted per window when the caller does not name a limit.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Window length and fallback limit for a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Length of each fixed window
    pub window: Duration,
    /// Limit applied when a check does not name one
    pub default_max_requests: u32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            default_max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

impl LimiterSettings {
    fn effective_max(&self, max_requests: Option<u32>) -> u32 {
        match max_requests {
            Some(max) if max > 0 => max,
            _ if self.default_max_requests > 0 => self.default_max_requests,
            _ => DEFAULT_MAX_REQUESTS,
        }
    }
}

/// Fixed-window request counter scoped by key.
///
/// One instance is meant to live for the whole process and be shared via
/// `Arc`. Counters are local to the process: separate instances, or a
/// restarted process, start from empty.
pub struct FixedWindowLimiter<C: Clock = SystemClock> {
    /// Window state indexed by key
    entries: DashMap<String, WindowEntry>,
    settings: LimiterSettings,
    clock: C,
}

impl FixedWindowLimiter {
    /// Create a limiter with the default window and limit on the wall clock.
    pub fn new() -> Self {
        Self::with_settings(LimiterSettings::default())
    }

    /// Create a limiter with custom settings on the wall clock.
    pub fn with_settings(settings: LimiterSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FixedWindowLimiter<C> {
    /// Create a limiter reading time from `clock`.
    pub fn with_clock(settings: LimiterSettings, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            settings,
            clock,
        }
    }

    /// Check and record one request for `key`.
    ///
    /// Never fails. The entry for `key` stays locked from lookup to update,
    /// so concurrent checks on one key cannot lose increments.
    pub fn check(&self, key: &str, max_requests: Option<u32>) -> RateLimitDecision {
        let max_requests = self.settings.effective_max(max_requests);
        let now = self.clock.now_ms();

        if let Some(mut entry) = self.entries.get_mut(key) {
            return self.decide(key, entry.value_mut(), now, max_requests);
        }

        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                self.decide(key, occupied.get_mut(), now, max_requests)
            }
            Entry::Vacant(vacant) => {
                let entry = vacant.insert(WindowEntry::start(now, self.settings.window));
                trace!(key = %key, reset_at = entry.reset_at(), "Opened rate limit window");
                RateLimitDecision::allow()
            }
        }
    }

    fn decide(
        &self,
        key: &str,
        entry: &mut WindowEntry,
        now: u64,
        max_requests: u32,
    ) -> RateLimitDecision {
        if entry.is_expired(now) {
            *entry = WindowEntry::start(now, self.settings.window);
            trace!(key = %key, reset_at = entry.reset_at(), "Opened rate limit window");
            return RateLimitDecision::allow();
        }

        if entry.try_admit(max_requests) {
            return RateLimitDecision::allow();
        }

        let retry_after_ms = entry.retry_after_ms(now);
        debug!(
            key = %key,
            count = entry.count(),
            max_requests = max_requests,
            retry_after_ms = retry_after_ms,
            "Rate limit exceeded"
        );
        RateLimitDecision::deny(retry_after_ms)
    }

    /// Requests admitted for `key` in its current (possibly stale) window.
    pub fn current_count(&self, key: &str) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.count())
    }

    /// Number of keys holding window state.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Settings this limiter was built with.
    pub fn settings(&self) -> LimiterSettings {
        self.settings
    }

    /// Clear all windows for all keys.
    ///
    /// Restores a clean slate between test cases; request handling code
    /// must not call it.
    pub fn reset_for_testing(&self) {
        self.entries.clear();
    }
}

impl<C: Clock> AdmissionControl for FixedWindowLimiter<C> {
    fn check(&self, key: &str, max_requests: Option<u32>) -> RateLimitDecision {
        FixedWindowLimiter::check(self, key, max_requests)
    }

    fn reset_for_testing(&self) {
        FixedWindowLimiter::reset_for_testing(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::sync::Arc;

    fn manual_limiter() -> (FixedWindowLimiter<ManualClock>, ManualClock) {
        let clock = ManualClock::new(0);
        let limiter = FixedWindowLimiter::with_clock(LimiterSettings::default(), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = FixedWindowLimiter::new();
        assert_eq!(limiter.key_count(), 0);
        assert_eq!(limiter.settings(), LimiterSettings::default());
    }

    #[test]
    fn test_unseen_key_is_allowed() {
        let (limiter, _) = manual_limiter();
        assert_eq!(limiter.check("org1", Some(1)), RateLimitDecision::allow());
        assert_eq!(limiter.current_count("org1"), Some(1));
    }

    #[test]
    fn test_window_scenario() {
        let (limiter, clock) = manual_limiter();

        assert!(limiter.check("org1", Some(3)).allowed);
        clock.set(10);
        assert!(limiter.check("org1", Some(3)).allowed);
        clock.set(20);
        assert!(limiter.check("org1", Some(3)).allowed);
        assert_eq!(limiter.current_count("org1"), Some(3));

        clock.set(30);
        assert_eq!(limiter.check("org1", Some(3)), RateLimitDecision::deny(59_970));

        clock.set(60_001);
        assert!(limiter.check("org1", Some(3)).allowed);
        assert_eq!(limiter.current_count("org1"), Some(1));

        // The new window runs until 120_001.
        limiter.check("org1", Some(3));
        limiter.check("org1", Some(3));
        clock.set(120_001);
        assert_eq!(limiter.check("org1", Some(3)), RateLimitDecision::deny(0));
        clock.set(120_002);
        assert!(limiter.check("org1", Some(3)).allowed);
    }

    #[test]
    fn test_denials_do_not_increment() {
        let (limiter, clock) = manual_limiter();
        limiter.check("org1", Some(2));
        limiter.check("org1", Some(2));

        let mut last = u64::MAX;
        for _ in 0..5 {
            clock.advance(Duration::from_millis(1_000));
            let decision = limiter.check("org1", Some(2));
            assert!(!decision.allowed);
            let retry = decision.retry_after_ms.unwrap();
            assert!(retry > 0);
            assert!(retry < last);
            last = retry;
        }
        assert_eq!(limiter.current_count("org1"), Some(2));
    }

    #[test]
    fn test_allowed_after_retry_after_elapses() {
        let (limiter, clock) = manual_limiter();
        limiter.check("org1", Some(1));

        let retry = limiter.check("org1", Some(1)).retry_after_ms.unwrap();
        clock.advance(Duration::from_millis(retry + 1));
        assert!(limiter.check("org1", Some(1)).allowed);
    }

    #[test]
    fn test_default_limit_applies() {
        let (limiter, _) = manual_limiter();
        for _ in 0..DEFAULT_MAX_REQUESTS {
            assert!(limiter.check("org1", None).allowed);
        }
        assert!(!limiter.check("org1", None).allowed);

        for _ in 0..DEFAULT_MAX_REQUESTS {
            assert!(limiter.check("org2", Some(0)).allowed);
        }
        assert!(!limiter.check("org2", Some(0)).allowed);
    }

    #[test]
    fn test_different_keys_have_separate_counters() {
        let (limiter, _) = manual_limiter();
        limiter.check("a", Some(1));
        assert!(!limiter.check("a", Some(1)).allowed);

        assert!(limiter.check("b", Some(1)).allowed);
        assert_eq!(limiter.key_count(), 2);
    }

    #[test]
    fn test_reset_for_testing_forgets_keys() {
        let (limiter, _) = manual_limiter();
        limiter.check("org1", Some(1));
        assert!(!limiter.check("org1", Some(1)).allowed);

        limiter.reset_for_testing();
        assert_eq!(limiter.key_count(), 0);
        assert_eq!(limiter.current_count("org1"), None);
        assert!(limiter.check("org1", Some(1)).allowed);
    }

    #[test]
    fn test_custom_window() {
        let clock = ManualClock::new(0);
        let settings = LimiterSettings {
            window: Duration::from_millis(500),
            default_max_requests: 1,
        };
        let limiter = FixedWindowLimiter::with_clock(settings, clock.clone());

        assert!(limiter.check("k", None).allowed);
        assert_eq!(limiter.check("k", None).retry_after_ms, Some(500));
        clock.set(501);
        assert!(limiter.check("k", None).allowed);
    }

    #[test]
    fn test_boundary_burst_is_preserved() {
        let (limiter, clock) = manual_limiter();
        clock.set(59_999);
        for _ in 0..3 {
            assert!(limiter.check("org1", Some(3)).allowed);
        }
        clock.set(120_000);
        for _ in 0..3 {
            assert!(limiter.check("org1", Some(3)).allowed);
        }
        assert!(!limiter.check("org1", Some(3)).allowed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_admit_exactly_max() {
        let max = 100u32;
        let limiter = Arc::new(FixedWindowLimiter::new());

        let handles: Vec<_> = (0..max + 20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("shared", Some(max)) })
            })
            .collect();

        let admitted = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(decision) if decision.allowed))
            .count();

        assert_eq!(admitted, max as usize);
        assert_eq!(limiter.current_count("shared"), Some(max));
    }

    #[test]
    fn test_usable_through_trait_object() {
        let (limiter, _) = manual_limiter();
        let backend: &dyn AdmissionControl = &limiter;
        assert!(backend.check("org1", Some(1)).allowed);
        assert!(!backend.check("org1", Some(1)).allowed);
        backend.reset_for_testing();
        assert!(backend.check("org1", Some(1)).allowed);
    }
}
