//! Middleware layer.
//!
//! Every route runs behind a [`Chain`]: an ordered list of [`Middleware`]
//! stages with the route's handler at the end. Each stage either answers the
//! request itself (short-circuit) or delegates to the rest of the chain via
//! [`Next::run`], and may inspect or rewrite what comes back.
//!
//! The [`Composer`] builds one chain per route at startup:
//!
//! ```text
//! ErrorTranslator → Compressor → [AuthValidator] → [Authorizer] → handler
//! ```
//!
//! - `AuthValidator` is present only when the route requires authentication.
//! - `Authorizer` is present only when the route lists required roles.
//!
//! Requests walk the list outer to inner. The translator sees every failure
//! that escapes; the compressor sees every response, rejections included;
//! the two auth stages run before the handler is ever called.

pub mod auth;
pub mod authorize;
pub mod compress;
pub mod translate;

use std::sync::Arc;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Outcome};
use crate::request::Request;
use crate::router::Route;
use crate::session::{Clock, SessionStore};

pub use auth::{AuthState, AuthValidator};
pub use authorize::Authorizer;
pub use compress::Compressor;
pub use translate::ErrorTranslator;

/// One stage of a chain: handle the request, or delegate to `next`.
pub trait Middleware: Send + Sync + 'static {
    /// Short identifier used in logs and diagnostics.
    fn name(&self) -> &'static str;

    fn handle<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome>;
}

/// The remainder of a chain, handed to each stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    endpoint: &'a BoxedHandler,
}

impl<'a> Next<'a> {
    /// Runs the remaining stages, then the handler.
    ///
    /// `ctx` may be borrowed for less than `'a`, so a stage can keep using
    /// its context after the inner stages return.
    pub fn run<'b>(self, ctx: &'b mut Context, mut req: Request) -> BoxFuture<'b, Outcome>
    where
        'a: 'b,
    {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(ctx, req, Next { stages: rest, endpoint: self.endpoint }),
            None => {
                req.set_session(ctx.session().cloned());
                self.endpoint.call(req)
            }
        }
    }
}

/// A route's composed stages plus its handler. Built once, run per request.
pub struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
    endpoint: BoxedHandler,
}

impl Chain {
    pub async fn run(&self, ctx: &mut Context, req: Request) -> Outcome {
        Next { stages: &self.stages, endpoint: &self.endpoint }.run(ctx, req).await
    }

    /// Stage names, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

/// Builds per-route chains from one shared set of stage instances.
///
/// Stages hold only read-only state (the session signing key, the clock),
/// so a single instance of each serves every route and every request.
pub struct Composer {
    translator: Arc<dyn Middleware>,
    compressor: Arc<dyn Middleware>,
    validator: Arc<dyn Middleware>,
    authorizer: Arc<dyn Middleware>,
}

impl Composer {
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            translator: Arc::new(ErrorTranslator),
            compressor: Arc::new(Compressor::default()),
            validator: Arc::new(AuthValidator::new(store, clock)),
            authorizer: Arc::new(Authorizer),
        }
    }

    pub fn compose(&self, route: &Route) -> Chain {
        let mut stages = vec![Arc::clone(&self.translator), Arc::clone(&self.compressor)];
        if route.requires_auth() {
            stages.push(Arc::clone(&self.validator));
        }
        if !route.required_roles().is_empty() {
            stages.push(Arc::clone(&self.authorizer));
        }
        Chain { stages, endpoint: Arc::clone(route.handler()) }
    }
}
