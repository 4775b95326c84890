//! Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Both are public routes: no session, no roles. They still run behind the
//! error translator and compressor like every other route.

use crate::{Request, Response};

/// Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"`. By the time a request can reach this handler
/// the config has been validated and the route table built, which is all the
/// service needs before taking traffic.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
