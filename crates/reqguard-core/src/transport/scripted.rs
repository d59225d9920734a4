//! In-memory transport that replays a per-path script of outcomes.

use super::{Request, Response, Transport};
use crate::retry::TransportError;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// One scripted exchange.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Status(u32),
    Io(io::ErrorKind),
    /// Raw libcurl error code.
    Curl(i32),
    /// Never completes; only the attempt deadline ends it.
    Hang,
}

#[derive(Default)]
struct PathState {
    steps: VecDeque<Step>,
    /// Repeated once the script runs out.
    last: Option<Step>,
    calls: Vec<(Instant, Duration)>,
}

/// Replays scripts keyed by request path. Paths without a script answer 200.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    paths: Mutex<HashMap<String, PathState>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, path: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.paths.lock().unwrap().entry(path.to_string()).or_default().steps = steps.into_iter().collect();
        self
    }

    /// Fail `failures` times with `step`, then answer 200.
    pub(crate) fn fail_then_succeed(self, path: &str, failures: u32, step: Step) -> Self {
        let steps = (0..failures).map(|_| step).chain([Step::Status(200)]);
        self.script(path, steps)
    }

    pub(crate) fn calls(&self, path: &str) -> u32 {
        self.paths
            .lock()
            .unwrap()
            .get(path)
            .map(|s| s.calls.len() as u32)
            .unwrap_or(0)
    }

    /// When each attempt was dispatched, and with which timeout.
    pub(crate) fn call_log(&self, path: &str) -> Vec<(Instant, Duration)> {
        self.paths
            .lock()
            .unwrap()
            .get(path)
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    fn next_step(&self, path: &str, timeout: Duration) -> Step {
        let mut paths = self.paths.lock().unwrap();
        let state = paths.entry(path.to_string()).or_default();
        state.calls.push((Instant::now(), timeout));
        let step = state
            .steps
            .pop_front()
            .or(state.last)
            .unwrap_or(Step::Status(200));
        state.last = Some(step);
        step
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        _url: &Url,
        request: &Request,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        let step = self.next_step(&request.path, timeout);
        async move {
            match step {
                Step::Status(code) => Ok(Response::new(code)),
                Step::Io(kind) => Err(TransportError::Io(io::Error::from(kind))),
                Step::Curl(code) => Err(TransportError::Curl(curl::Error::new(code as _))),
                Step::Hang => std::future::pending().await,
            }
        }
    }
}
