//! Streaming response body.
//!
//! A handler either has the whole body at hand ([`Body::full`]) or produces it
//! piece by piece ([`Body::from_stream`]). Both end up behind the same boxed
//! [`http_body::Body`], which hyper polls one frame at a time. Nothing is read
//! from a stream until the connection is ready to write it, so a slow client
//! slows the producer down instead of filling memory.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};

/// Error type carried by a failing body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The body of a [`Response`](crate::Response).
pub struct Body(UnsyncBoxBody<Bytes, BoxError>);

impl Body {
    /// Wraps any `http_body::Body` that yields [`Bytes`].
    pub fn new<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self(body.map_err(Into::into).boxed_unsync())
    }

    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    /// A body that is already fully in memory. Reports an exact size hint, so
    /// hyper sends `content-length` instead of chunked encoding.
    pub fn full(data: impl Into<Bytes>) -> Self {
        Self::new(Full::new(data.into()))
    }

    /// A body produced lazily from a stream of chunks.
    ///
    /// An `Err` item ends the response abruptly: hyper aborts the transfer so
    /// the client can tell the body is incomplete.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(StreamBody::new(stream.map_ok(Frame::data)))
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.0).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.0.size_hint()
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self { Self::full(b) }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self { Self::full(v) }
}

impl From<String> for Body {
    fn from(s: String) -> Self { Self::full(s) }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self { Self::full(s) }
}
