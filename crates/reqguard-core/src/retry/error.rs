//! Raw transport failures and the classified error handed back to callers.

use super::classify::{classify, ErrorClass};
use crate::transport::Response;
use std::time::Duration;
use thiserror::Error;

/// Raw failure descriptor for a single attempt, exactly as observed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// libcurl reported an error (timeout, DNS, connect, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Socket-level error from a transport that talks to the OS directly.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The exchange completed with a non-2xx status. The full response is kept
    /// so callers can read the server's error body.
    #[error("HTTP {}", .0.status)]
    Status(Response),
    /// The attempt did not finish within its deadline.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
    /// The logical request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,
    /// Base URL and path could not be joined.
    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The request asked for a zero timeout.
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    /// The worker running a blocking transport call failed (e.g. panicked).
    #[error("transport worker failed: {0}")]
    Worker(String),
}

impl TransportError {
    /// HTTP status when the failure is a non-2xx response.
    pub fn status(&self) -> Option<u32> {
        match self {
            TransportError::Status(resp) => Some(resp.status),
            _ => None,
        }
    }
}

/// Terminal failure of a logical request: the last observed error, its
/// classification and how many attempts were dispatched.
#[derive(Debug, Error)]
#[error("{class} after {attempts} attempt(s): {error}")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub attempts: u32,
    #[source]
    pub error: TransportError,
}

impl ClassifiedError {
    /// Classify `error` as observed on attempt number `attempts`.
    pub fn new(error: TransportError, attempts: u32) -> Self {
        Self {
            class: classify(&error),
            attempts,
            error,
        }
    }

    pub(crate) fn cancelled(attempts: u32) -> Self {
        Self::new(TransportError::Cancelled, attempts)
    }

    pub fn is_cancelled(&self) -> bool {
        self.class == ErrorClass::Cancelled
    }

    /// The unmodified last error.
    pub fn into_inner(self) -> TransportError {
        self.error
    }

    /// The server's response when the request ended on a non-2xx status.
    pub fn response(&self) -> Option<&Response> {
        match &self.error {
            TransportError::Status(resp) => Some(resp),
            _ => None,
        }
    }
}
