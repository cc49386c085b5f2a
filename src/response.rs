//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. Bodies are streamed:
//! whatever you hand over is polled by the connection one chunk at a time.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::body::{Body, BoxError};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    NdJson,       // application/x-ndjson
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::NdJson      => "application/x-ndjson",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use http::StatusCode;
/// use spout::Response;
///
/// Response::json(r#"{"id":1}"#);
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use http::StatusCode;
/// use spout::{ContentType, Response};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/customers/42")
///     .json(r#"{"id":42}"#);
///
/// Response::builder()
///     .bytes(ContentType::Csv, "id,name\n1,alice\n");
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK`: `application/json`, from already-serialised bytes.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`: `application/json`, serialising `value` with serde.
    ///
    /// Serialisation failures become `500 Internal Server Error`.
    pub fn json_value<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self::json(bytes),
            Err(e) => {
                error!(error = %e, "failed to serialise response body");
                Self::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// `200 OK`: a JSON array streamed element by element.
    ///
    /// Each element is serialised only when the connection asks for the next
    /// chunk. An `Err` from the stream aborts the body mid-array.
    pub fn json_array<S, T, E>(items: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        Self::builder().stream(ContentType::Json, json_array_chunks(items))
    }

    /// `200 OK`: `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Body::empty() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn into_body(self) -> Body { self.body }

    /// Replaces the body with `f(body)`, keeping status and headers untouched.
    pub fn map_body(self, f: impl FnOnce(Body) -> Body) -> Self {
        Self { status: self.status, headers: self.headers, body: f(self.body) }
    }

    pub(crate) fn into_inner(self) -> http::Response<Body> {
        let mut res = http::Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

fn json_array_chunks<S, T, E>(items: S) -> impl Stream<Item = Result<Bytes, BoxError>> + Send
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Serialize + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    // (items, nothing emitted yet, finished)
    let state = (Box::pin(items), true, false);
    futures_util::stream::unfold(state, |(mut items, first, done)| async move {
        if done {
            return None;
        }
        match items.next().await {
            Some(Ok(item)) => {
                let mut buf = vec![if first { b'[' } else { b',' }];
                match serde_json::to_writer(&mut buf, &item) {
                    Ok(()) => Some((Ok(Bytes::from(buf)), (items, false, false))),
                    Err(e) => Some((Err(e.into()), (items, false, true))),
                }
            }
            Some(Err(e)) => Some((Err(e.into()), (items, false, true))),
            None => {
                let tail: &'static [u8] = if first { b"[]" } else { b"]" };
                Some((Ok(Bytes::from_static(tail)), (items, false, true)))
            }
        }
    })
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so the content type always matches the body.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning rather than failing the whole response.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
    {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!("dropping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json, Body::full(body))
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Body::full(body.into()))
    }

    /// Terminate with a typed, fully buffered body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, Body::full(body))
    }

    /// Terminate with a typed body produced lazily from a stream.
    pub fn stream<S, E>(self, content_type: ContentType, chunks: S) -> Response
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.finish(content_type, Body::from_stream(chunks))
    }

    /// Terminate with no body (e.g. `204 No Content`, `301 Moved Permanently`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::empty() }
    }

    fn finish(mut self, content_type: ContentType, body: Body) -> Response {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { status: self.status, headers: self.headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Lets handlers use `?`: both arms render themselves.
impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}
