//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Telling every open connection to finish its in-flight request and close,
//!    instead of waiting for idle keep-alive clients to hang up.
//! 3. Returning from [`Server::serve`] once they have, so `main` exits cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{Instrument, debug, error, info, info_span};

use crate::body::Body;
use crate::error::Error;
use crate::router::Router;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use spout::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { bind: Bind::Addr(addr) }
    }

    /// Serves on a listener that is already bound, e.g. to port 0 in tests.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener) }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but shuts down when `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, router: Router, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;

        // Shared, not copied, across connection tasks.
        let router = Arc::new(router);

        info!(%addr, "spout listening");

        // `auto::Builder` handles both HTTP/1.1 and HTTP/2, whatever the
        // client negotiates.
        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting new
                // connections even if more are queued.
                biased;

                () = &mut signal => {
                    info!("shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| dispatch(Arc::clone(&router), req));

                    let conn = builder.serve_connection(TokioIo::new(stream), svc).into_owned();
                    let conn = graceful.watch(conn);

                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(%peer, "connection error: {e}");
                        }
                    });
                }
            }
        }

        // Drain: every watched connection finishes its in-flight work.
        graceful.shutdown().await;

        info!("spout stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request inside its own span.
///
/// Infallible: every failure is already a response (404, 400, 500), so hyper
/// never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Body>, Infallible> {
    let span = info_span!("request", method = %req.method(), path = %req.uri().path());
    let response = router.handle(req).instrument(span).await;
    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C) the process receives.
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
