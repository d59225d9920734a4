//! Backoff scheduling for one logical request.
//!
//! A logical request moves through `Pending -> (Waiting -> Pending)* ->
//! Succeeded | FailedFinal | Cancelled`. [`attempt`] runs one `Pending` step
//! and reports what should happen next; [`wait`] is the `Waiting` state. The
//! dispatcher drives the two in a loop, threading a [`RequestAttempt`]
//! through by value.

use super::error::{ClassifiedError, TransportError};
use super::policy::{RetryDecision, RetryPolicy};
use crate::transport::{Request, Response, Transport};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-request retry bookkeeping. Lives on the stack of the logical request
/// that created it and is advanced by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAttempt {
    attempt_count: u32,
    original_timeout: Duration,
}

impl RequestAttempt {
    /// State for the first attempt of a logical request.
    pub fn first(original_timeout: Duration) -> Self {
        Self {
            attempt_count: 1,
            original_timeout,
        }
    }

    /// 1-based number of the attempt this state describes.
    pub fn count(&self) -> u32 {
        self.attempt_count
    }

    pub fn original_timeout(&self) -> Duration {
        self.original_timeout
    }

    /// State for the following attempt.
    #[must_use]
    pub fn next(self) -> Self {
        Self {
            attempt_count: self.attempt_count.saturating_add(1),
            ..self
        }
    }

    /// Deadline for this attempt, given the time elapsed since the logical
    /// request began. Retries get the full original timeout when
    /// `reset_on_retry` is set and whatever is left of it otherwise; `None`
    /// means nothing is left.
    pub fn timeout(&self, reset_on_retry: bool, elapsed: Duration) -> Option<Duration> {
        if self.attempt_count <= 1 || reset_on_retry {
            return Some(self.original_timeout);
        }
        let remaining = self.original_timeout.saturating_sub(elapsed);
        (!remaining.is_zero()).then_some(remaining)
    }
}

/// Add up to 10% random extra delay. Saturates at `Duration::MAX`.
pub fn jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.0..=0.1);
    let extra = Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX);
    delay.saturating_add(extra)
}

/// Result of one attempt.
#[derive(Debug)]
pub enum Outcome {
    /// 2xx response; terminal.
    Success(Response),
    /// Retryable failure within budget: wait `after`, then try again.
    Retry {
        after: Duration,
        error: ClassifiedError,
    },
    /// Non-retryable failure or budget exhausted; terminal, carries the error.
    Final(ClassifiedError),
}

/// Run attempt `state.count()` of `request` with its own deadline and decide
/// what comes next under `policy`.
pub async fn attempt<T: Transport>(
    transport: &T,
    url: &Url,
    request: &Request,
    policy: &RetryPolicy,
    state: RequestAttempt,
    timeout: Duration,
) -> Outcome {
    let result = match tokio::time::timeout(timeout, transport.execute(url, request, timeout)).await
    {
        Ok(r) => r,
        Err(_) => Err(TransportError::TimedOut(timeout)),
    };
    let raw = match result {
        Ok(resp) if resp.is_success() => return Outcome::Success(resp),
        Ok(resp) => TransportError::Status(resp),
        Err(e) => e,
    };

    let n = state.count();
    let error = ClassifiedError::new(raw, n);
    match policy.decide(n, error.class) {
        RetryDecision::RetryAfter(after) => {
            tracing::debug!(
                policy = policy.name(),
                attempt = n,
                class = %error.class,
                delay_ms = after.as_millis() as u64,
                "{} {} failed ({}), retrying",
                request.method,
                url,
                error.error
            );
            Outcome::Retry { after, error }
        }
        RetryDecision::NoRetry => {
            if policy.is_retryable(error.class) {
                tracing::warn!(
                    policy = policy.name(),
                    attempt = n,
                    class = %error.class,
                    "{} {} failed ({}), retry budget of {} exhausted",
                    request.method,
                    url,
                    error.error,
                    policy.max_retries()
                );
            } else {
                tracing::debug!(
                    policy = policy.name(),
                    attempt = n,
                    class = %error.class,
                    "{} {} failed ({}), not retryable",
                    request.method,
                    url,
                    error.error
                );
            }
            Outcome::Final(error)
        }
    }
}

/// Park for `delay` without blocking the thread. Returns `false` if `cancel`
/// fired first.
pub async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
