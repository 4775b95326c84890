//! Role-based access check.

use std::future::ready;

use http::StatusCode;
use tracing::debug;

use super::{Middleware, Next};
use crate::context::Context;
use crate::error::ChainError;
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;

/// Grants the request when the session holds any of the route's required
/// roles, or when the route requires none.
///
/// Must sit after [`AuthValidator`](super::AuthValidator). Finding no
/// session here means the chain was composed wrongly; that is reported as an
/// internal failure, never as a 403.
pub struct Authorizer;

impl Middleware for Authorizer {
    fn name(&self) -> &'static str { "authorizer" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let Some(session) = ctx.session() else {
            return Box::pin(ready(Err(ChainError::InternalContract {
                stage: "authorizer",
                missing: "a validated session",
            })));
        };

        let required = ctx.route().required_roles();
        if required.is_empty() || session.has_any_role(required) {
            return next.run(ctx, req);
        }

        debug!(
            subject = %session.subject_id,
            route = %ctx.route().pattern(),
            "session lacks every required role"
        );
        Box::pin(ready(Ok(Response::error(StatusCode::FORBIDDEN))))
    }
}
