//! Destinations for tapped response bodies.
//!
//! A [`LogSink`] is called synchronously from inside the body's poll, once per
//! chunk, right before the chunk goes to the client. It must not block: do the
//! in-memory part there and hand any real I/O to a background task, the way
//! [`TracingSink`] and [`ChannelSink`] do.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{Span, info, warn};

use super::body_log::TapSummary;

/// Failure to record a chunk. Never affects the response itself.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log channel is full, chunk dropped")]
    Backlogged,

    #[error("log channel is closed")]
    Closed,

    #[error("log write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives copies of response body chunks.
///
/// Implemented for closures `Fn(&Bytes) -> Result<(), LogError>`.
pub trait LogSink: Send + Sync + 'static {
    /// Records one chunk. `chunk` is a handle to the same buffer the client
    /// receives; cloning it is a reference-count bump, not a copy.
    fn write(&self, chunk: &Bytes) -> Result<(), LogError>;

    /// Called once when a tapped body reaches a terminal state.
    fn close(&self, _summary: &TapSummary) {}
}

impl<F> LogSink for F
where
    F: Fn(&Bytes) -> Result<(), LogError> + Send + Sync + 'static,
{
    fn write(&self, chunk: &Bytes) -> Result<(), LogError> {
        self(chunk)
    }
}

/// Emits every chunk as an `INFO` event on target `spout::body`, parented to
/// the request span the chunk belongs to.
///
/// `write` only queues the chunk. The events are emitted from the blocking
/// pool, so a subscriber that writes to stdout synchronously never stalls a
/// response. When the queue is full, chunks are dropped from the log.
/// Non-UTF-8 bytes are rendered lossily. Silence it with
/// `RUST_LOG=spout::body=off`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    tx: mpsc::Sender<(Span, Bytes)>,
}

impl TracingSink {
    /// Creates a sink and the blocking task that emits its events. Must be
    /// called from within a tokio runtime.
    ///
    /// The task ends once every clone of the sink is dropped.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<(Span, Bytes)>(capacity.max(1));
        let handle = tokio::task::spawn_blocking(move || {
            while let Some((span, chunk)) = rx.blocking_recv() {
                info!(
                    target: "spout::body",
                    parent: &span,
                    len = chunk.len(),
                    body = %String::from_utf8_lossy(&chunk),
                    "response chunk"
                );
            }
        });
        (Self { tx }, handle)
    }
}

impl LogSink for TracingSink {
    fn write(&self, chunk: &Bytes) -> Result<(), LogError> {
        self.tx.try_send((Span::current(), chunk.clone())).map_err(|e| match e {
            TrySendError::Full(_) => LogError::Backlogged,
            TrySendError::Closed(_) => LogError::Closed,
        })
    }
}

/// Queues chunks on a bounded channel.
///
/// `write` never waits: when the consumer falls behind, chunks are dropped
/// from the log (reported as [`LogError::Backlogged`]) while the response
/// carries on.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Creates a sink whose chunks are written, one per line, to `writer` by a
    /// background task. Must be called from within a tokio runtime.
    ///
    /// The task ends once every clone of the sink is dropped, or on the first
    /// write error, after which the sink reports [`LogError::Closed`].
    pub fn spawn_writer<W>(writer: W, capacity: usize) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, rx) = Self::new(capacity);
        let handle = tokio::spawn(drain(rx, writer));
        (sink, handle)
    }
}

impl LogSink for ChannelSink {
    fn write(&self, chunk: &Bytes) -> Result<(), LogError> {
        self.tx.try_send(chunk.clone()).map_err(|e| match e {
            TrySendError::Full(_) => LogError::Backlogged,
            TrySendError::Closed(_) => LogError::Closed,
        })
    }
}

async fn drain<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = write_line(&mut writer, &chunk).await {
            warn!(error = %e, "body log writer failed, closing");
            return;
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    writer.write_all(chunk).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn channel_sink_reports_backlog_then_closure() {
        let (sink, rx) = ChannelSink::new(1);

        assert!(sink.write(&Bytes::from("ab")).is_ok());
        assert!(matches!(sink.write(&Bytes::from("cd")), Err(LogError::Backlogged)));

        drop(rx);
        assert!(matches!(sink.write(&Bytes::from("ef")), Err(LogError::Closed)));
    }

    #[tokio::test]
    async fn channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::new(8);
        for chunk in ["ab", "cd", "ef"] {
            sink.write(&Bytes::from(chunk)).unwrap();
        }
        drop(sink);

        let mut seen = Vec::new();
        while let Some(chunk) = rx.recv().await {
            seen.push(chunk);
        }
        assert_eq!(seen, ["ab", "cd", "ef"]);
    }

    #[tokio::test]
    async fn writer_task_writes_one_line_per_chunk() {
        let (client, mut server) = tokio::io::duplex(64);
        let (sink, handle) = ChannelSink::spawn_writer(client, 8);

        sink.write(&Bytes::from("ab")).unwrap();
        sink.write(&Bytes::from("cd")).unwrap();
        drop(sink);
        handle.await.unwrap();

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "ab\ncd\n");
    }

    #[test]
    fn closures_are_sinks() {
        let sink = |chunk: &Bytes| -> Result<(), LogError> {
            if chunk.is_empty() { Err(LogError::Closed) } else { Ok(()) }
        };
        assert!(LogSink::write(&sink, &Bytes::from("x")).is_ok());
        assert!(LogSink::write(&sink, &Bytes::new()).is_err());
    }

    #[tokio::test]
    async fn tracing_sink_emits_off_the_calling_task() {
        let (sink, handle) = TracingSink::spawn(8);

        assert!(sink.write(&Bytes::from_static(&[0xff, 0xfe])).is_ok());
        assert!(sink.write(&Bytes::from("ab")).is_ok());
        drop(sink);

        handle.await.unwrap();
    }
}
