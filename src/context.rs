//! Per-request state threaded through the middleware chain.

use std::sync::Arc;

use crate::config::Config;
use crate::router::Route;
use crate::session::{ResponseHeaders, Session};

/// Everything a stage may need to know about the request in flight.
///
/// One `Context` is created per request by the dispatcher and dropped when
/// the response is produced. Stages receive it by `&mut`, so two requests can
/// never observe each other's session or staged headers.
#[derive(Debug)]
pub struct Context {
    route: Arc<Route>,
    config: Arc<Config>,
    session: Option<Session>,
    headers: ResponseHeaders,
}

impl Context {
    pub fn new(route: Arc<Route>, config: Arc<Config>) -> Self {
        Self { route, config, session: None, headers: ResponseHeaders::default() }
    }

    pub fn route(&self) -> &Route { &self.route }
    pub fn config(&self) -> &Config { &self.config }

    /// The validated session. `None` until the auth validator has run.
    pub fn session(&self) -> Option<&Session> { self.session.as_ref() }

    pub(crate) fn attach_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    /// Headers every response from this request will carry.
    pub fn headers_mut(&mut self) -> &mut ResponseHeaders { &mut self.headers }

    pub(crate) fn into_headers(self) -> ResponseHeaders { self.headers }
}
