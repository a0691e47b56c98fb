//! Request-side helpers for applying admission decisions.

use std::fmt;

use super::backend::AdmissionControl;
use crate::error::{Result, VergoError};

/// A key scoped to the unit a route limits on.
///
/// The limiter accepts any string; this type only keeps the scoping
/// convention consistent across call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// One quota per organization.
    pub fn organization(id: impl fmt::Display) -> Self {
        Self::custom("org", id)
    }

    /// One quota per user.
    pub fn user(id: impl fmt::Display) -> Self {
        Self::custom("user", id)
    }

    /// One quota per client address.
    pub fn ip(addr: impl fmt::Display) -> Self {
        Self::custom("ip", addr)
    }

    /// Any other scope, e.g. `custom("reconciliation", run_id)`.
    pub fn custom(scope: &str, id: impl fmt::Display) -> Self {
        Self(format!("{}:{}", scope, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Admit a request or turn the denial into [`VergoError::RateLimited`].
///
/// Handlers propagate the error with `?` and map it to a response through
/// [`VergoError::status_code`] and [`VergoError::retry_after_secs`].
pub fn enforce<A, K>(limiter: &A, key: K, max_requests: Option<u32>) -> Result<()>
where
    A: AdmissionControl + ?Sized,
    K: AsRef<str>,
{
    let key = key.as_ref();
    let decision = limiter.check(key, max_requests);
    if decision.allowed {
        return Ok(());
    }

    Err(VergoError::RateLimited {
        key: key.to_string(),
        retry_after_ms: decision.retry_after_ms.unwrap_or_default(),
    })
}
