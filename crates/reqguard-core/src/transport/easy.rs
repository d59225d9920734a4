//! libcurl-backed transport.

use super::{Request, Response, Transport};
use crate::retry::TransportError;
use std::future::Future;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Transport that performs each exchange with a fresh `curl::easy::Easy`
/// handle on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    connect_timeout: Duration,
    follow_redirects: bool,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            follow_redirects: true,
        }
    }
}

impl CurlTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound for the TCP/TLS connect phase. Never exceeds the attempt timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }
}

impl Transport for CurlTransport {
    fn execute(
        &self,
        url: &Url,
        request: &Request,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        let url = url.to_string();
        let request = request.clone();
        let timeout = curl_limit(timeout);
        let connect_timeout = curl_limit(self.connect_timeout.min(timeout));
        let follow = self.follow_redirects;
        async move {
            let abort = Arc::new(AtomicBool::new(false));
            // Dropping this future (cancel, deadline) stops the transfer too.
            let _guard = AbortOnDrop(Arc::clone(&abort));
            tokio::task::spawn_blocking(move || {
                perform(&url, &request, timeout, connect_timeout, follow, &abort)
            })
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))?
        }
    }
}

/// Raises the abort flag of a blocking transfer when dropped.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// libcurl takes whole milliseconds and treats 0 as "no limit", so round up
/// and never go below 1 ms.
fn curl_limit(d: Duration) -> Duration {
    let mut ms = d.as_millis();
    if d.subsec_nanos() % 1_000_000 != 0 {
        ms += 1;
    }
    Duration::from_millis(u64::try_from(ms.max(1)).unwrap_or(u64::MAX))
}

/// Runs one blocking exchange. Non-2xx statuses are returned as `Ok`; the
/// dispatcher decides what they mean.
fn perform(
    url: &str,
    request: &Request,
    timeout: Duration,
    connect_timeout: Duration,
    follow: bool,
    abort: &AtomicBool,
) -> Result<Response, TransportError> {
    let mut headers: Vec<String> = Vec::new();
    let mut body: Vec<u8> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(follow)?;
    easy.connect_timeout(connect_timeout)?;
    easy.timeout(timeout)?;
    easy.progress(true)?;
    easy.custom_request(request.method.as_str())?;
    if let Some(data) = &request.body {
        easy.post_fields_copy(data)?;
    }

    let mut list = curl::easy::List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    if !request.headers.is_empty() {
        easy.http_headers(list)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                // Status lines and the blank terminator are not headers.
                if !line.is_empty() && !line.starts_with("HTTP/") {
                    headers.push(line.to_string());
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    Ok(Response {
        status,
        headers,
        body,
    })
}
