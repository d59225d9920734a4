//! Request instrumentation hooks.
//!
//! The dispatcher emits a start marker when a logical request is dispatched
//! and one report when it reaches a terminal outcome. Where those go (a
//! metrics store, a debug panel) is up to the implementation.

use crate::retry::ErrorClass;
use std::sync::Arc;
use std::time::Duration;

/// Terminal report for one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReport {
    /// e.g. `GET /clients`.
    pub operation: String,
    pub url: String,
    /// Wall-clock time from first dispatch to terminal outcome, backoff included.
    pub duration: Duration,
    pub succeeded: bool,
    pub error: Option<ErrorClass>,
    /// Transport attempts actually dispatched.
    pub attempts: u32,
    /// Duration exceeded the dispatcher's slow threshold.
    pub slow: bool,
}

impl RequestReport {
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Sink for request timings. Purely observational.
pub trait Instrumentation: Send + Sync {
    fn request_started(&self, operation: &str, url: &str);

    fn request_finished(&self, report: &RequestReport);

    /// Called after `request_finished` when the request was slow.
    fn slow_request(&self, report: &RequestReport) {
        let _ = report;
    }
}

impl<I: Instrumentation + ?Sized> Instrumentation for Arc<I> {
    fn request_started(&self, operation: &str, url: &str) {
        (**self).request_started(operation, url)
    }

    fn request_finished(&self, report: &RequestReport) {
        (**self).request_finished(report)
    }

    fn slow_request(&self, report: &RequestReport) {
        (**self).slow_request(report)
    }
}

/// Default sink: structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn request_started(&self, operation: &str, url: &str) {
        tracing::trace!("start {} ({})", operation, url);
    }

    fn request_finished(&self, report: &RequestReport) {
        match report.error {
            None => tracing::debug!(
                attempts = report.attempts,
                duration_ms = report.duration_ms(),
                "{} ok",
                report.operation
            ),
            Some(class) => tracing::info!(
                attempts = report.attempts,
                duration_ms = report.duration_ms(),
                class = %class,
                "{} failed",
                report.operation
            ),
        }
    }

    fn slow_request(&self, report: &RequestReport) {
        tracing::warn!(
            "slow request: {} took {} ms ({} attempts)",
            report.operation,
            report.duration_ms(),
            report.attempts
        );
    }
}
