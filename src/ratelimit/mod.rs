//! Rate limiting logic and state management.

mod backend;
mod clock;
mod entry;
mod guard;
mod limiter;

pub use backend::{AdmissionControl, RateLimitDecision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::WindowEntry;
pub use guard::{enforce, RateLimitKey};
pub use limiter::{FixedWindowLimiter, LimiterSettings, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
