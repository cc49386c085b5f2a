//! Handler trait and type erasure.
//!
//! The router stores handlers of *different* concrete types in one radix tree
//! per method, so each one is hidden behind `dyn ErasedHandler`:
//!
//! ```text
//! async fn get_customer(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/customers/{id}", get_customer)
//! get_customer.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_customer))                       ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time                      ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_customer(req).await.into_response() })
//! ```
//!
//! Handlers that need shared state are closures over an `Arc`:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use spout::{Request, Response, Router};
//! let greeting = Arc::new(String::from("hello"));
//! let app = Router::new().get("/", move |_req: Request| {
//!     let greeting = Arc::clone(&greeting);
//!     async move { Response::text(greeting.as_str()) }
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the return type of the public
/// `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the shape:
///
/// ```text
/// Fn(Request) -> impl Future<Output = impl IntoResponse>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Builds a handler that receives shared state alongside each request.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use spout::{Request, Response, Router, with_state};
/// struct Greeter { greeting: String }
///
/// async fn greet(state: Arc<Greeter>, _req: Request) -> Response {
///     Response::text(state.greeting.clone())
/// }
///
/// let state = Arc::new(Greeter { greeting: "hello".into() });
/// let app = Router::new().get("/", with_state(&state, greet));
/// ```
pub fn with_state<S, F, Fut, R>(state: &Arc<S>, f: F) -> impl Handler + use<S, F, Fut, R>
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    let state = Arc::clone(state);
    move |req: Request| f(Arc::clone(&state), req)
}
