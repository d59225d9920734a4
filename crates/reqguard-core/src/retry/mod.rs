//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, DNS and connect
//! failures, 5xx, throttling) and backoff decisions so that every outbound
//! call shares a consistent, explicitly chosen policy.

mod backoff;
mod classify;
mod error;
mod policy;
mod registry;

pub use backoff::{attempt, jitter, wait, Outcome, RequestAttempt};
pub use classify::{classify, classify_curl_error, classify_http_status, classify_io_error, ErrorClass};
pub use error::{ClassifiedError, TransportError};
pub use policy::{Backoff, DelayFn, RetryCondition, RetryDecision, RetryPolicy, RetryPredicate};
pub use registry::{PolicyName, PolicyRegistry, RegistryError};
