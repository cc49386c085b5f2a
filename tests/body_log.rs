//! End-to-end: a real server with the body tap installed, driven over TCP.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use spout::catfact::FactClient;
use spout::customer::{AppState, InMemoryCustomerRepository, routes};
use spout::middleware::{BodyLog, ChannelSink, LogError, LogSink, TapOutcome, TapSummary, Trace};
use spout::{BoxError, ContentType, Request, Response, Router, Server};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

#[derive(Default)]
struct Recorder {
    chunks: Mutex<Vec<Bytes>>,
    summaries: Mutex<Vec<TapSummary>>,
    fail: bool,
}

impl Recorder {
    fn logged(&self) -> Bytes {
        self.chunks.lock().unwrap().concat().into()
    }
}

impl LogSink for Recorder {
    fn write(&self, chunk: &Bytes) -> Result<(), LogError> {
        if self.fail {
            return Err(LogError::Closed);
        }
        self.chunks.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    fn close(&self, summary: &TapSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

async fn start(router: Router) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        Server::from_listener(listener)
            .serve_with_shutdown(router, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    (addr, tx, handle)
}

/// Sends a GET and returns status plus the collected body. Fails if the
/// connection breaks before the body ends, head included.
async fn get(addr: SocketAddr, path: &str) -> Result<(http::StatusCode, Bytes), hyper::Error> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(conn);

    let req = http::Request::get(path)
        .header("host", addr.to_string())
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = sender.send_request(req).await?;
    let status = res.status();
    let body = res.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

/// Waits for the tap to report; hyper drops the body just after the last write.
async fn summary(recorder: &Recorder) -> TapSummary {
    for _ in 0..100 {
        if let Some(summary) = recorder.summaries.lock().unwrap().first() {
            return summary.clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("tap never reported");
}

fn customer_app(recorder: &Arc<Recorder>) -> Router {
    let state = Arc::new(AppState {
        customers: InMemoryCustomerRepository::with_customers(["alice", "bob", "carol"]),
        facts: FactClient::new("http://127.0.0.1:9/fact", Duration::from_millis(100)).unwrap(),
    });
    routes(state)
        .layer(Trace)
        .layer(BodyLog::from_shared(Arc::clone(recorder) as Arc<dyn LogSink>))
}

#[tokio::test]
async fn logged_bytes_match_delivered_bytes() {
    let recorder = Arc::new(Recorder::default());
    let (addr, shutdown, server) = start(customer_app(&recorder)).await;

    let (status, body) = get(addr, "/customers").await.unwrap();

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body, r#"[{"id":1,"name":"alice"},{"id":2,"name":"bob"},{"id":3,"name":"carol"}]"#);
    assert_eq!(recorder.logged(), body);

    let summary = summary(&recorder).await;
    assert_eq!(summary.outcome, TapOutcome::Completed);
    assert_eq!(summary.bytes, body.len() as u64);
    // "[{…}" ",{…}" ",{…}" "]"
    assert_eq!(summary.chunks, 4);

    shutdown.send(()).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn failing_sink_leaves_responses_intact() {
    let baseline = Arc::new(Recorder::default());
    let (addr, _shutdown, _server) = start(customer_app(&baseline)).await;
    let (_, expected) = get(addr, "/customers/2").await.unwrap();

    let failing = Arc::new(Recorder { fail: true, ..Recorder::default() });
    let (addr, _shutdown, _server) = start(customer_app(&failing)).await;
    let (status, body) = get(addr, "/customers/2").await.unwrap();

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body, expected);
    let summary = summary(&failing).await;
    assert_eq!(summary.outcome, TapOutcome::Completed);
    assert_eq!(summary.log_failures, 1);
}

#[tokio::test]
async fn upstream_failure_reaches_the_client() {
    let recorder = Arc::new(Recorder::default());
    let router = Router::new()
        .get("/broken", |_req: Request| async {
            let chunks: Vec<Result<Bytes, BoxError>> = vec![
                Ok(Bytes::from("ab")),
                Ok(Bytes::from("cd")),
                Err("storage went away".into()),
                Ok(Bytes::from("ef")),
            ];
            Response::builder().stream(ContentType::OctetStream, stream::iter(chunks))
        })
        .layer(BodyLog::from_shared(Arc::clone(&recorder) as Arc<dyn LogSink>));
    let (addr, _shutdown, _server) = start(router).await;

    // The error can land before hyper flushes the head, so the client may
    // see either a truncated body or no response at all. Never a clean one.
    let res = get(addr, "/broken").await;

    assert!(res.is_err(), "client got a complete response: {res:?}");
    assert_eq!(summary(&recorder).await.outcome, TapOutcome::Failed);
    assert_eq!(recorder.logged(), "abcd");
}

#[tokio::test]
async fn unknown_routes_are_tapped_too() {
    let recorder = Arc::new(Recorder::default());
    let (addr, _shutdown, _server) = start(customer_app(&recorder)).await;

    let (status, body) = get(addr, "/nowhere").await.unwrap();

    assert_eq!(status, http::StatusCode::NOT_FOUND);
    assert!(body.is_empty());
    let summary = summary(&recorder).await;
    assert_eq!(summary.chunks, 0);
    assert_eq!(summary.outcome, TapOutcome::Completed);
}

#[tokio::test]
async fn writer_flushes_queued_chunks_after_shutdown() {
    let (log_in, mut log_out) = tokio::io::duplex(4_096);
    let (sink, writer) = ChannelSink::spawn_writer(log_in, 64);
    let router = Router::new()
        .get("/hello", |_req: Request| async { "hello" })
        .layer(BodyLog::new(sink));
    let (addr, shutdown, server) = start(router).await;

    let (_, body) = get(addr, "/hello").await.unwrap();
    assert_eq!(body, "hello");

    shutdown.send(()).unwrap();
    server.await.unwrap();
    // Every sink clone went down with the server.
    writer.await.unwrap();

    let mut out = String::new();
    log_out.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "hello\n");
}
