//! Unified error type.

use http::StatusCode;
use tracing::error;

use crate::response::{IntoResponse, Response};

/// The error type returned by spout's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`] values, not as `Error`s. This type surfaces infrastructure
/// failures: binding a port, accepting a connection, or talking to an
/// upstream service. Returned from a handler it becomes a `5xx` response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("hyper: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("http: {0}")]
    Http(#[from] http::Error),

    #[error("invalid uri: {0}")]
    Uri(#[from] http::uri::InvalidUri),

    #[error("unsupported url `{0}`: expected an absolute http:// or https:// url")]
    UnsupportedUrl(String),

    #[error("tls config: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error("tls handshake: {0}")]
    Tls(#[source] std::io::Error),

    #[error("upstream responded with {0}")]
    UpstreamStatus(StatusCode),

    #[error("upstream sent an unreadable body: {0}")]
    UpstreamBody(#[source] serde_json::Error),

    #[error("upstream timed out")]
    Timeout,

    #[error("no customer ids left")]
    IdsExhausted,

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Connect(_)
            | Self::Tls(_)
            | Self::Hyper(_)
            | Self::Timeout
            | Self::UpstreamBody(_)
            | Self::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %self, status = status.as_u16(), "handler failed");
        Response::status(status)
    }
}
