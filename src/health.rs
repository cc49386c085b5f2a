//! Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! ```rust,no_run
//! use spout::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Swap `readiness` for your own handler when traffic should wait on a
//! dependency (a database pool, a downstream service).

use crate::{Request, Response};

/// Always `200 OK` with body `"ok"`. No dependencies on purpose: if the
/// process can answer HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Default readiness probe: `200 OK` with body `"ready"`.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
