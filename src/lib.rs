//! Vergo rate limiting
//!
//! In-process, key-scoped admission control for Vergo's request handlers.
//! Each key gets a fixed window of configurable length with a cap on the
//! requests admitted inside it; denials carry a retry-after hint. Counters
//! live in the process only and are not coordinated across instances.

pub mod config;
pub mod error;
pub mod ratelimit;
