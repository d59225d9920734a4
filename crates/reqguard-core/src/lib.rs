pub mod config;
pub mod logging;

pub mod dispatcher;
pub mod retry;
pub mod transport;

pub use dispatcher::{Dispatcher, DispatcherError, Instrumentation, RequestReport};
pub use retry::{ClassifiedError, ErrorClass, PolicyName, RetryPolicy, TransportError};
pub use transport::{CurlTransport, Method, Request, Response, Transport};
