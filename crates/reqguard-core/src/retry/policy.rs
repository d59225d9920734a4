use super::backoff::jitter;
use super::classify::ErrorClass;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Delay function: 1-based retry number to wait time.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Retry predicate over classified errors.
pub type RetryPredicate = Arc<dyn Fn(ErrorClass) -> bool + Send + Sync>;

/// How long to wait before retry number `n`.
#[derive(Clone)]
pub enum Backoff {
    /// `min(base * 2^n, ceiling)`.
    Exponential { base: Duration, ceiling: Duration },
    /// Same wait before every retry.
    Constant(Duration),
    /// Caller-supplied delay function.
    Custom(DelayFn),
}

impl Backoff {
    pub fn exponential(base: Duration, ceiling: Duration) -> Self {
        Backoff::Exponential { base, ceiling }
    }

    /// Delay before retry `n` (1-based), without jitter.
    pub fn delay(&self, n: u32) -> Duration {
        match self {
            Backoff::Exponential { base, ceiling } => {
                let factor = 2u32.saturating_pow(n);
                base.saturating_mul(factor).min(*ceiling)
            }
            Backoff::Constant(d) => *d,
            Backoff::Custom(f) => f(n),
        }
    }

    /// Upper bound on `delay`, when known.
    pub fn ceiling(&self) -> Option<Duration> {
        match self {
            Backoff::Exponential { ceiling, .. } => Some(*ceiling),
            Backoff::Constant(d) => Some(*d),
            Backoff::Custom(_) => None,
        }
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::Exponential { base, ceiling } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("ceiling", ceiling)
                .finish(),
            Backoff::Constant(d) => f.debug_tuple("Constant").field(d).finish(),
            Backoff::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Which classified errors a policy retries. `Cancelled` is never retried,
/// whatever the condition says.
#[derive(Clone)]
pub enum RetryCondition {
    OneOf(Vec<ErrorClass>),
    Custom(RetryPredicate),
}

impl RetryCondition {
    pub fn matches(&self, class: ErrorClass) -> bool {
        match self {
            RetryCondition::OneOf(classes) => classes.contains(&class),
            RetryCondition::Custom(f) => f(class),
        }
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCondition::OneOf(classes) => f.debug_tuple("OneOf").field(classes).finish(),
            RetryCondition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Connection-level failures plus 5xx.
const NETWORK_AND_SERVER: [ErrorClass; 5] = [
    ErrorClass::Timeout,
    ErrorClass::DnsFailure,
    ErrorClass::ConnectionRefused,
    ErrorClass::NetworkUnreachable,
    ErrorClass::ServerError,
];

/// Named, immutable retry policy. Built once and shared behind an `Arc`;
/// per-request state lives in [`RequestAttempt`](super::RequestAttempt).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: String,
    max_retries: u32,
    backoff: Backoff,
    retry_on: RetryCondition,
    reset_timeout_on_retry: bool,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(
        name: impl Into<String>,
        max_retries: u32,
        backoff: Backoff,
        retry_on: RetryCondition,
        reset_timeout_on_retry: bool,
    ) -> Self {
        Self {
            name: name.into(),
            max_retries,
            backoff,
            retry_on,
            reset_timeout_on_retry,
            jitter: false,
        }
    }

    /// Policy from plain closures: `retries` additional attempts, `retry_delay`
    /// per retry number, `retry_condition` over classified errors.
    pub fn custom<D, C>(
        name: impl Into<String>,
        retries: u32,
        retry_delay: D,
        retry_condition: C,
        should_reset_timeout: bool,
    ) -> Self
    where
        D: Fn(u32) -> Duration + Send + Sync + 'static,
        C: Fn(ErrorClass) -> bool + Send + Sync + 'static,
    {
        Self::new(
            name,
            retries,
            Backoff::Custom(Arc::new(retry_delay)),
            RetryCondition::Custom(Arc::new(retry_condition)),
            should_reset_timeout,
        )
    }

    /// Business-critical calls (sales, payments): 3 retries, 1s doubling, 5s cap.
    pub fn critical() -> Self {
        Self::new(
            "critical",
            3,
            Backoff::exponential(Duration::from_millis(1000), Duration::from_millis(5000)),
            RetryCondition::OneOf(NETWORK_AND_SERVER.to_vec()),
            true,
        )
    }

    /// Regular reads and writes: 2 retries, 500ms doubling, 3s cap.
    pub fn normal() -> Self {
        Self::new(
            "normal",
            2,
            Backoff::exponential(Duration::from_millis(500), Duration::from_millis(3000)),
            RetryCondition::OneOf(NETWORK_AND_SERVER.to_vec()),
            true,
        )
    }

    /// Background refreshes: one retry after 1s, only on timeouts and 5xx.
    pub fn low_priority() -> Self {
        Self::new(
            "low_priority",
            1,
            Backoff::Constant(Duration::from_millis(1000)),
            RetryCondition::OneOf(vec![ErrorClass::Timeout, ErrorClass::ServerError]),
            false,
        )
    }

    /// Enable up to 10% random extra delay on every retry.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retry budget: additional attempts allowed after the first.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn retry_condition(&self) -> &RetryCondition {
        &self.retry_on
    }

    pub fn reset_timeout_on_retry(&self) -> bool {
        self.reset_timeout_on_retry
    }

    pub fn jitter_enabled(&self) -> bool {
        self.jitter
    }

    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        class != ErrorClass::Cancelled && self.retry_on.matches(class)
    }

    /// Delay before retry `n` (1-based), with jitter when enabled.
    pub fn delay(&self, n: u32) -> Duration {
        let d = self.backoff.delay(n);
        if self.jitter {
            jitter(d)
        } else {
            d
        }
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed with `class`.
    ///
    /// The returned delay is for retry number `attempt`, i.e. the attempt that
    /// would follow.
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if !self.is_retryable(class) {
            return RetryDecision::NoRetry;
        }
        if attempt >= self.max_attempts() {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay(attempt))
    }
}
