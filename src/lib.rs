//! # spout
//!
//! A minimal streaming HTTP framework for services behind a reverse proxy,
//! and the Customer service built on it.
//!
//! ## The contract
//!
//! The proxy owns TLS, rate limiting, slow clients and body-size limits.
//! spout owns the part that changes between applications:
//!
//! - Radix-tree routing: O(path-length) lookup via [`matchit`]
//! - Streaming bodies: hyper pulls each chunk when the client can take it
//! - Response middleware: tracing, and tapping bodies into a log
//! - Graceful shutdown: SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use spout::middleware::{BodyLog, Trace, TracingSink};
//! use spout::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (sink, _events) = TracingSink::spawn(1_024);
//!     let app = Router::new()
//!         .get("/customers/{id}", get_customer)
//!         .layer(Trace)
//!         .layer(BodyLog::new(sink));
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(app).await.unwrap();
//! }
//!
//! async fn get_customer(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//! ```

mod body;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod catfact;
pub mod config;
pub mod customer;
pub mod health;
pub mod middleware;

#[cfg(test)]
mod testing;

pub use body::{Body, BoxError};
pub use error::Error;
pub use handler::{Handler, with_state};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
