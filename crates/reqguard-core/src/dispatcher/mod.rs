//! Request dispatcher: the single entry point for outbound calls.
//!
//! A [`Dispatcher`] owns a transport, a base URL, a default per-attempt
//! timeout and a bound retry policy. Each call to [`Dispatcher::send`] is one
//! logical request: it gets its own [`RequestAttempt`], runs the backoff loop
//! until a terminal outcome and reports the timing to the instrumentation
//! sink. Nothing about one request is visible to another, so a dispatcher can
//! be shared freely (e.g. behind an `Arc`) between concurrent tasks.

mod instrument;

pub use instrument::{Instrumentation, RequestReport, TracingInstrumentation};

use crate::retry::{
    attempt, wait, ClassifiedError, Outcome, PolicyName, RequestAttempt, RetryPolicy,
    TransportError,
};
use crate::transport::{Request, Response, Transport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Requests slower than this (backoff included) are reported as slow.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(5000);

/// Error building a dispatcher.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base URL {0:?} cannot have paths joined onto it")]
    NotABase(String),
    #[error("default timeout must be greater than zero")]
    ZeroTimeout,
}

pub struct Dispatcher<T, I = TracingInstrumentation> {
    transport: T,
    base_url: Url,
    default_timeout: Duration,
    policy: Arc<RetryPolicy>,
    instrumentation: I,
    slow_threshold: Duration,
}

impl<T: Transport> Dispatcher<T> {
    /// Dispatcher bound to one of the built-in policies.
    pub fn new(
        transport: T,
        base_url: &str,
        default_timeout: Duration,
        policy: PolicyName,
    ) -> Result<Self, DispatcherError> {
        Self::with_policy(transport, base_url, default_timeout, policy.policy())
    }

    /// Dispatcher bound to any policy (e.g. a custom one from the registry).
    pub fn with_policy(
        transport: T,
        base_url: &str,
        default_timeout: Duration,
        policy: Arc<RetryPolicy>,
    ) -> Result<Self, DispatcherError> {
        if default_timeout.is_zero() {
            return Err(DispatcherError::ZeroTimeout);
        }
        let mut base = Url::parse(base_url).map_err(|source| DispatcherError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        if base.cannot_be_a_base() {
            return Err(DispatcherError::NotABase(base_url.to_string()));
        }
        // Paths are joined relative to the base, so it must end in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            transport,
            base_url: base,
            default_timeout,
            policy,
            instrumentation: TracingInstrumentation,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        })
    }
}

impl<T: Transport, I: Instrumentation> Dispatcher<T, I> {
    /// Replace the instrumentation sink.
    pub fn with_instrumentation<J: Instrumentation>(self, instrumentation: J) -> Dispatcher<T, J> {
        Dispatcher {
            transport: self.transport,
            base_url: self.base_url,
            default_timeout: self.default_timeout,
            policy: self.policy,
            instrumentation,
            slow_threshold: self.slow_threshold,
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn policy(&self) -> &Arc<RetryPolicy> {
        &self.policy
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Absolute URL for a request path. Leading slashes are relative to the
    /// base URL, not the host root; absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    /// Send `request` under the dispatcher's bound policy.
    pub async fn send(&self, request: Request) -> Result<Response, ClassifiedError> {
        self.send_with(request, &self.policy, &CancellationToken::new())
            .await
    }

    /// Send `request` under the bound policy; cancelling `cancel` stops it
    /// before the next attempt (or aborts the one in flight).
    pub async fn send_cancellable(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, ClassifiedError> {
        self.send_with(request, &self.policy, cancel).await
    }

    /// Send `request` under an explicit policy for this call only.
    pub async fn send_with(
        &self,
        request: Request,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Response, ClassifiedError> {
        let operation = request.operation();
        let started = Instant::now();

        let url = match self.resolve(&request.path) {
            Ok(url) => url,
            Err(e) => {
                self.instrumentation.request_started(&operation, &request.path);
                let err = ClassifiedError::new(e.into(), 0);
                self.finish(&operation, &request.path, started, 0, Err(err.class));
                return Err(err);
            }
        };

        self.instrumentation.request_started(&operation, url.as_str());
        if request.timeout.is_some_and(|t| t.is_zero()) {
            let err = ClassifiedError::new(TransportError::ZeroTimeout, 0);
            self.finish(&operation, url.as_str(), started, 0, Err(err.class));
            return Err(err);
        }
        let (result, attempts) = self.run(&url, &request, policy, cancel, started).await;
        let status = result.as_ref().map(|_| ()).map_err(|e| e.class);
        self.finish(&operation, url.as_str(), started, attempts, status);
        result
    }

    /// The retry loop. Returns the terminal result and the number of attempts
    /// dispatched.
    async fn run(
        &self,
        url: &Url,
        request: &Request,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        started: Instant,
    ) -> (Result<Response, ClassifiedError>, u32) {
        let original_timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut state = RequestAttempt::first(original_timeout);
        let mut timeout = original_timeout;

        if cancel.is_cancelled() {
            return (Err(ClassifiedError::cancelled(0)), 0);
        }

        loop {
            let n = state.count();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("{} {} cancelled during attempt {}", request.method, url, n);
                    return (Err(ClassifiedError::cancelled(n)), n);
                }
                outcome = attempt(&self.transport, url, request, policy, state, timeout) => outcome,
            };

            match outcome {
                Outcome::Success(resp) => {
                    if n > 1 {
                        tracing::debug!("{} {} succeeded on attempt {}", request.method, url, n);
                    }
                    return (Ok(resp), n);
                }
                Outcome::Final(err) => return (Err(err), n),
                Outcome::Retry { after, error } => {
                    if !wait(after, cancel).await {
                        tracing::info!(
                            "{} {} cancelled while waiting to retry (after attempt {})",
                            request.method,
                            url,
                            n
                        );
                        return (Err(ClassifiedError::cancelled(n)), n);
                    }
                    let next = state.next();
                    match next.timeout(policy.reset_timeout_on_retry(), started.elapsed()) {
                        Some(t) => {
                            timeout = t;
                            state = next;
                        }
                        None => {
                            tracing::warn!(
                                "{} {}: no time left of {:?} for attempt {}",
                                request.method,
                                url,
                                original_timeout,
                                next.count()
                            );
                            return (Err(error), n);
                        }
                    }
                }
            }
        }
    }

    fn finish(
        &self,
        operation: &str,
        url: &str,
        started: Instant,
        attempts: u32,
        status: Result<(), crate::retry::ErrorClass>,
    ) {
        let duration = started.elapsed();
        let report = RequestReport {
            operation: operation.to_string(),
            url: url.to_string(),
            duration,
            succeeded: status.is_ok(),
            error: status.err(),
            attempts,
            slow: duration > self.slow_threshold,
        };
        self.instrumentation.request_finished(&report);
        if report.slow {
            self.instrumentation.slow_request(&report);
        }
    }
}
