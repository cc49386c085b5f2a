use tracing::{info, warn};

use super::{Exchange, Middleware};
use crate::response::Response;

/// Logs one event per request: method, path, status and latency.
///
/// Latency is measured up to the moment the response head is ready. Streamed
/// bodies keep flowing after that; [`BodyLog`](super::BodyLog) reports their
/// completion separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn on_response(&self, exchange: &Exchange, res: Response) -> Response {
        let status = res.status_code().as_u16();
        let latency_ms = exchange.elapsed().as_secs_f64() * 1000.0;

        if res.status_code().is_server_error() {
            warn!(method = %exchange.method(), path = exchange.path(), status, latency_ms, "request failed");
        } else {
            info!(method = %exchange.method(), path = exchange.path(), status, latency_ms, "request completed");
        }
        res
    }
}
