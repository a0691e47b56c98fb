//! Per-key window state.

use std::time::Duration;

/// Counter for one key within one fixed window.
///
/// An entry is never moved to a new window in place; the limiter replaces
/// it with a fresh one from [`WindowEntry::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Requests admitted in this window
    count: u32,
    /// End of the window, in clock milliseconds
    reset_at: u64,
}

impl WindowEntry {
    /// Open a window at `now_ms` with the first request already admitted.
    pub fn start(now_ms: u64, window: Duration) -> Self {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Self {
            count: 1,
            reset_at: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether the window has ended. The boundary instant itself still
    /// belongs to the window.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.reset_at
    }

    /// Admit one more request if the window has room.
    ///
    /// A rejected attempt leaves the count untouched.
    pub fn try_admit(&mut self, max_requests: u32) -> bool {
        if self.count >= max_requests {
            return false;
        }
        self.count += 1;
        true
    }

    /// Milliseconds left until the window ends.
    pub fn retry_after_ms(&self, now_ms: u64) -> u64 {
        self.reset_at.saturating_sub(now_ms)
    }

    /// Requests admitted so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// End of the window.
    pub fn reset_at(&self) -> u64 {
        self.reset_at
    }
}
