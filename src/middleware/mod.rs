//! Middleware layer.
//!
//! Middleware sees every response on its way out and is the right place for
//! cross-cutting concerns. A layer receives the [`Exchange`] (what was asked
//! for, and when) and the handler's [`Response`], and returns the response to
//! send. It may swap the body, add headers, or just observe.
//!
//! Built-in middleware:
//! - [`Trace`]: one event per request with method, path, status, latency
//! - [`BodyLog`]: taps every response body and copies it to a [`LogSink`]
//!
//! Dispatch runs each request inside an `info_span!("request")`, so events a
//! layer emits (including from a body it wraps) carry the method and path.

use std::time::{Duration, Instant};

use http::Method;

use crate::response::Response;

pub mod body_log;
pub mod sink;
mod trace;

pub use body_log::{BodyLog, TapBody, TapOutcome, TapSummary};
pub use sink::{ChannelSink, LogError, LogSink, TracingSink};
pub use trace::Trace;

/// Response middleware.
///
/// Also implemented for closures `Fn(&Exchange, Response) -> Response`.
pub trait Middleware: Send + Sync + 'static {
    fn on_response(&self, exchange: &Exchange, res: Response) -> Response;
}

impl<F> Middleware for F
where
    F: Fn(&Exchange, Response) -> Response + Send + Sync + 'static,
{
    fn on_response(&self, exchange: &Exchange, res: Response) -> Response {
        self(exchange, res)
    }
}

/// What a middleware knows about the request behind a response.
#[derive(Debug, Clone)]
pub struct Exchange {
    method: Method,
    path: String,
    started: Instant,
}

impl Exchange {
    pub(crate) fn new(method: Method, path: String) -> Self {
        Self { method, path, started: Instant::now() }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }

    /// Time since the request was received.
    pub fn elapsed(&self) -> Duration { self.started.elapsed() }
}
