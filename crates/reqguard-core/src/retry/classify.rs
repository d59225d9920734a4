//! Classify curl errors, socket errors and HTTP statuses into retry classes.

use super::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level classification of a failed attempt.
///
/// The classifier never decides retryability; that is up to each policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connect or transfer exceeded its deadline.
    Timeout,
    /// Host (or proxy) name could not be resolved.
    DnsFailure,
    /// The peer actively refused the connection.
    ConnectionRefused,
    /// No route to the network or host.
    NetworkUnreachable,
    /// HTTP 5xx.
    ServerError,
    /// HTTP 429.
    RateLimited,
    /// Any other HTTP 4xx.
    ClientError,
    /// The caller cancelled the logical request.
    Cancelled,
    /// Anything we cannot place (never retried by default).
    Unknown,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; 9] = [
        ErrorClass::Timeout,
        ErrorClass::DnsFailure,
        ErrorClass::ConnectionRefused,
        ErrorClass::NetworkUnreachable,
        ErrorClass::ServerError,
        ErrorClass::RateLimited,
        ErrorClass::ClientError,
        ErrorClass::Cancelled,
        ErrorClass::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::DnsFailure => "dns_failure",
            ErrorClass::ConnectionRefused => "connection_refused",
            ErrorClass::NetworkUnreachable => "network_unreachable",
            ErrorClass::ServerError => "server_error",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ClientError => "client_error",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an HTTP status code. Only meaningful for non-2xx statuses.
pub fn classify_http_status(code: u32) -> ErrorClass {
    match code {
        429 => ErrorClass::RateLimited,
        500..=599 => ErrorClass::ServerError,
        400..=499 => ErrorClass::ClientError,
        _ => ErrorClass::Unknown,
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> ErrorClass {
    if e.is_operation_timedout() {
        return ErrorClass::Timeout;
    }
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return ErrorClass::DnsFailure;
    }
    if e.is_couldnt_connect() {
        // libcurl folds every connect failure into one code; the detail text
        // still carries the OS reason.
        let unreachable = e
            .extra_description()
            .map(|d| d.to_ascii_lowercase().contains("unreachable"))
            .unwrap_or(false);
        return if unreachable {
            ErrorClass::NetworkUnreachable
        } else {
            ErrorClass::ConnectionRefused
        };
    }
    if e.is_aborted_by_callback() {
        return ErrorClass::Cancelled;
    }
    ErrorClass::Unknown
}

/// Classify an OS socket error.
pub fn classify_io_error(e: &std::io::Error) -> ErrorClass {
    match e.kind() {
        std::io::ErrorKind::TimedOut => return ErrorClass::Timeout,
        std::io::ErrorKind::ConnectionRefused => return ErrorClass::ConnectionRefused,
        _ => {}
    }
    #[cfg(unix)]
    {
        if let Some(code) = e.raw_os_error() {
            if code == libc::ENETUNREACH || code == libc::EHOSTUNREACH {
                return ErrorClass::NetworkUnreachable;
            }
        }
    }
    ErrorClass::Unknown
}

/// Classify any raw transport failure.
pub fn classify(e: &TransportError) -> ErrorClass {
    match e {
        TransportError::Curl(ce) => classify_curl_error(ce),
        TransportError::Io(io) => classify_io_error(io),
        TransportError::Status(resp) => classify_http_status(resp.status),
        TransportError::TimedOut(_) => ErrorClass::Timeout,
        TransportError::Cancelled => ErrorClass::Cancelled,
        TransportError::InvalidUrl(_)
        | TransportError::ZeroTimeout
        | TransportError::Worker(_) => ErrorClass::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Response;
    use std::io;
    use std::time::Duration;

    #[test]
    fn http_429_rate_limited() {
        assert_eq!(classify_http_status(429), ErrorClass::RateLimited);
    }

    #[test]
    fn http_5xx_server_error() {
        for code in [500, 502, 503, 504, 599] {
            assert_eq!(classify_http_status(code), ErrorClass::ServerError, "{}", code);
        }
    }

    #[test]
    fn http_4xx_client_error() {
        assert_eq!(classify_http_status(400), ErrorClass::ClientError);
        assert_eq!(classify_http_status(403), ErrorClass::ClientError);
        assert_eq!(classify_http_status(404), ErrorClass::ClientError);
        assert_eq!(classify_http_status(499), ErrorClass::ClientError);
    }

    #[test]
    fn http_other_unknown() {
        assert_eq!(classify_http_status(302), ErrorClass::Unknown);
        assert_eq!(classify_http_status(600), ErrorClass::Unknown);
    }

    #[test]
    fn curl_codes_map_directly() {
        // CURLE_OPERATION_TIMEDOUT, CURLE_COULDNT_RESOLVE_HOST,
        // CURLE_COULDNT_RESOLVE_PROXY, CURLE_COULDNT_CONNECT, CURLE_ABORTED_BY_CALLBACK
        assert_eq!(classify_curl_error(&curl::Error::new(28)), ErrorClass::Timeout);
        assert_eq!(classify_curl_error(&curl::Error::new(6)), ErrorClass::DnsFailure);
        assert_eq!(classify_curl_error(&curl::Error::new(5)), ErrorClass::DnsFailure);
        assert_eq!(
            classify_curl_error(&curl::Error::new(7)),
            ErrorClass::ConnectionRefused
        );
        assert_eq!(classify_curl_error(&curl::Error::new(42)), ErrorClass::Cancelled);
        // CURLE_SSL_CONNECT_ERROR
        assert_eq!(classify_curl_error(&curl::Error::new(35)), ErrorClass::Unknown);
    }

    #[test]
    fn io_errors_map_by_kind() {
        let e = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_io_error(&e), ErrorClass::Timeout);
        let e = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io_error(&e), ErrorClass::ConnectionRefused);
        let e = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_io_error(&e), ErrorClass::Unknown);
    }

    #[cfg(unix)]
    #[test]
    fn io_unreachable_from_os_code() {
        let e = io::Error::from_raw_os_error(libc::ENETUNREACH);
        assert_eq!(classify_io_error(&e), ErrorClass::NetworkUnreachable);
        let e = io::Error::from_raw_os_error(libc::EHOSTUNREACH);
        assert_eq!(classify_io_error(&e), ErrorClass::NetworkUnreachable);
    }

    #[test]
    fn transport_errors_classify() {
        let status = TransportError::Status(Response::new(503));
        assert_eq!(classify(&status), ErrorClass::ServerError);
        assert_eq!(
            classify(&TransportError::TimedOut(Duration::from_secs(1))),
            ErrorClass::Timeout
        );
        assert_eq!(classify(&TransportError::Cancelled), ErrorClass::Cancelled);
        assert_eq!(
            classify(&TransportError::Worker("panicked".into())),
            ErrorClass::Unknown
        );
    }

    #[test]
    fn class_labels_match_serde_names() {
        for class in ErrorClass::ALL {
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.as_str()));
        }
    }
}
