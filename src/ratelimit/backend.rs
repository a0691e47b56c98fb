//! Admission control trait and the decision it returns.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Milliseconds until the key's window ends, present on denial only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitDecision {
    /// An admitted request.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
        }
    }

    /// A rejected request with its retry hint.
    pub fn deny(retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            retry_after_ms: Some(retry_after_ms),
        }
    }

    /// The retry hint as a `Duration`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

/// Trait for admission control implementations.
///
/// Request handlers are written against this trait rather than a concrete
/// limiter, so a backend with shared external state can replace the
/// in-process one without touching call sites.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether one more request for `key` is admitted.
    ///
    /// `None` or `Some(0)` for `max_requests` selects the backend's default.
    fn check(&self, key: &str, max_requests: Option<u32>) -> RateLimitDecision;

    /// Forget all state. Only for isolating test cases.
    fn reset_for_testing(&self);
}
