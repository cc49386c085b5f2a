//! Response body tap.
//!
//! [`TapBody`] sits between a handler's body and the connection writer. Each
//! data frame hyper pulls through it is shown to a [`LogSink`] and then handed
//! on untouched: same buffer, same order, same chunk boundaries. The sink gets
//! a refcounted handle to the chunk, not a copy, so the buffer is released
//! when the last of the two lets go of it.
//!
//! ```text
//!   handler body ──poll──▶ TapBody ──frame──▶ hyper ──▶ client
//!                             │
//!                             └──&Bytes──▶ LogSink::write
//! ```
//!
//! Nothing is pulled from the inner body that hyper did not ask for, so the
//! client's pace still drives the producer. A failing sink is counted and
//! warned about once; the response never notices.
//!
//! Lifecycle per response:
//!
//! ```text
//! Idle ──frame──▶ Streaming ──end──▶ Completed
//!   │                 │
//!   │                 └──error──▶ Failed
//!   └──(empty body)──▶ Completed
//! dropped before a terminal state ──▶ Aborted
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tracing::{Span, debug, warn};

use super::sink::LogSink;
use super::{Exchange, Middleware};
use crate::body::Body;
use crate::response::Response;

/// How a tapped body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// The inner body reached its end and every chunk was forwarded.
    Completed,
    /// The inner body yielded an error, which was forwarded as-is.
    Failed,
    /// The body was dropped before its end: client gone or write failure.
    Aborted,
}

/// Totals for one tapped body, reported once it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapSummary {
    pub chunks: usize,
    pub bytes: u64,
    pub log_failures: usize,
    pub outcome: TapOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Streaming,
    Done(TapOutcome),
}

/// A body that copies its data frames to a [`LogSink`] as they pass.
///
/// Status, headers, size hint and end-of-stream are those of the inner body,
/// so wrapping a response changes nothing the client can observe.
pub struct TapBody<B> {
    inner: B,
    sink: Arc<dyn LogSink>,
    span: Span,
    state: State,
    chunks: usize,
    bytes: u64,
    log_failures: usize,
}

impl<B> TapBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    pub fn new(inner: B, sink: Arc<dyn LogSink>) -> Self {
        Self::with_span(inner, sink, Span::none())
    }

    /// Like [`new`](Self::new), attributing sink writes and the final
    /// summary to `span`.
    pub fn with_span(inner: B, sink: Arc<dyn LogSink>, span: Span) -> Self {
        let mut tap = Self {
            inner,
            sink,
            span,
            state: State::Idle,
            chunks: 0,
            bytes: 0,
            log_failures: 0,
        };
        // hyper never polls a body that is already at its end.
        if tap.inner.is_end_stream() {
            tap.finish(TapOutcome::Completed);
        }
        tap
    }

    /// The outcome, once the body has ended.
    pub fn outcome(&self) -> Option<TapOutcome> {
        match self.state {
            State::Done(outcome) => Some(outcome),
            State::Idle | State::Streaming => None,
        }
    }
}

impl<B> TapBody<B> {
    fn record(&mut self, chunk: &Bytes) {
        self.chunks += 1;
        self.bytes += chunk.len() as u64;

        let _entered = self.span.enter();
        if let Err(e) = self.sink.write(chunk) {
            self.log_failures += 1;
            if self.log_failures == 1 {
                warn!(error = %e, chunk = self.chunks, "response body logging failed, delivery unaffected");
            }
        }
    }

    fn finish(&mut self, outcome: TapOutcome) {
        if let State::Done(_) = self.state {
            return;
        }
        self.state = State::Done(outcome);

        let summary = TapSummary {
            chunks: self.chunks,
            bytes: self.bytes,
            log_failures: self.log_failures,
            outcome,
        };
        let _entered = self.span.enter();
        debug!(
            chunks = summary.chunks,
            bytes = summary.bytes,
            log_failures = summary.log_failures,
            outcome = ?summary.outcome,
            "response body tap finished"
        );
        self.sink.close(&summary);
    }
}

impl<B> HttpBody for TapBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let State::Done(_) = this.state {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                this.state = State::Streaming;
                if let Some(chunk) = frame.data_ref() {
                    this.record(chunk);
                }
                if this.inner.is_end_stream() {
                    this.finish(TapOutcome::Completed);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                this.finish(TapOutcome::Failed);
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finish(TapOutcome::Completed);
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, State::Done(_)) || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for TapBody<B> {
    fn drop(&mut self) {
        self.finish(TapOutcome::Aborted);
    }
}

/// Middleware that taps every response body into a shared [`LogSink`].
///
/// ```rust,no_run
/// use spout::Router;
/// use spout::middleware::{BodyLog, TracingSink};
///
/// # async fn run() {
/// let (sink, _events) = TracingSink::spawn(1_024);
/// let app = Router::new().layer(BodyLog::new(sink));
/// # }
/// ```
#[derive(Clone)]
pub struct BodyLog {
    sink: Arc<dyn LogSink>,
}

impl BodyLog {
    pub fn new(sink: impl LogSink) -> Self {
        Self { sink: Arc::new(sink) }
    }

    pub fn from_shared(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Wraps a single body without going through a router.
    pub fn tap<B>(&self, body: B) -> TapBody<B>
    where
        B: HttpBody<Data = Bytes> + Unpin,
    {
        TapBody::with_span(body, Arc::clone(&self.sink), Span::current())
    }
}

impl Middleware for BodyLog {
    fn on_response(&self, _exchange: &Exchange, res: Response) -> Response {
        res.map_body(|body| Body::new(self.tap(body)))
    }
}
