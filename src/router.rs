//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler; response middleware is applied on the way out.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use http::{Method, StatusCode};
use http_body_util::BodyExt;
use matchit::Router as MatchitRouter;
use tracing::warn;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Exchange, Middleware};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), middleware: Vec::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are read with `req.param("name")`:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use spout::{Request, Response, Router};
    /// # async fn get_customer(_: Request) -> Response { Response::text("") }
    /// # async fn create_customer(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/customers/{id}", get_customer)
    ///     .on(Method::POST, "/customers",      create_customer);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with an existing route.
    /// Routes are fixed at startup, so this is a programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Adds response middleware. Layers run in registration order, each one
    /// receiving the response produced by the previous.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Routes one request and produces one response, middleware applied.
    ///
    /// The request body is collected before the handler runs. This is what
    /// the server calls per request; it is public so a router can be
    /// exercised without a socket.
    pub async fn handle<B>(&self, req: http::Request<B>) -> Response
    where
        B: http_body::Body,
        B::Error: Display,
    {
        let exchange = Exchange::new(req.method().clone(), req.uri().path().to_owned());

        let response = match self.lookup(req.method(), req.uri().path()) {
            Some((handler, params)) => {
                let (parts, body) = req.into_parts();
                match body.collect().await {
                    Ok(collected) => {
                        handler.call(Request::new(parts, collected.to_bytes(), params)).await
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read request body");
                        Response::status(StatusCode::BAD_REQUEST)
                    }
                }
            }
            None => Response::status(StatusCode::NOT_FOUND),
        };

        self.middleware
            .iter()
            .fold(response, |res, layer| layer.on_response(&exchange, res))
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use crate::{Request, Response};

    use super::*;

    async fn noop(_req: Request) -> Response {
        Response::text("")
    }

    #[test]
    fn lookup_extracts_params() {
        let router = Router::new().get("/customers/{id}", noop);

        let (_, params) = router.lookup(&Method::GET, "/customers/7").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn lookup_is_per_method() {
        let router = Router::new().get("/customers", noop);

        assert!(router.lookup(&Method::GET, "/customers").is_some());
        assert!(router.lookup(&Method::POST, "/customers").is_none());
        assert!(router.lookup(&Method::GET, "/nope").is_none());
    }

    #[tokio::test]
    async fn handle_applies_middleware_in_order() {
        let router = Router::new()
            .get("/customers/{id}", |req: Request| async move {
                Response::text(format!("customer {}", req.param("id").unwrap_or("?")))
            })
            .layer(|_: &Exchange, res: Response| {
                Response::builder().status(res.status_code()).header("x-first", "1").text("replaced")
            })
            .layer(|ex: &Exchange, res: Response| {
                assert_eq!(ex.path(), "/customers/5");
                assert_eq!(res.headers()["x-first"], "1");
                res
            });

        let req = http::Request::get("/customers/5").body(http_body_util::Empty::<bytes::Bytes>::new()).unwrap();
        let res = router.handle(req).await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let router = Router::new().get("/customers", noop);
        let req = http::Request::post("/customers").body(http_body_util::Empty::<bytes::Bytes>::new()).unwrap();
        assert_eq!(router.handle(req).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics() {
        let _ = Router::new().get("/a", noop).get("/a", noop);
    }
}
