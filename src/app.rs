//! Request dispatch: route table plus one pre-composed chain per route.

use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::config::Config;
use crate::context::Context;
use crate::error::Error;
use crate::middleware::{Chain, Composer};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Resolution, Route, RouteTable};
use crate::session::{Clock, SessionStore, SystemClock};

/// A fully assembled application, ready to be served.
///
/// Everything in here is read-only once built; the server shares one `App`
/// across every connection behind an `Arc`.
pub struct App {
    config: Arc<Config>,
    table: RouteTable,
    chains: Vec<Chain>,
}

impl App {
    pub fn new(config: Arc<Config>, routes: impl IntoIterator<Item = Route>) -> Result<Self, Error> {
        Self::with_clock(config, routes, Arc::new(SystemClock))
    }

    /// Like [`App::new`] with an explicit clock for session expiry.
    pub fn with_clock(
        config: Arc<Config>,
        routes: impl IntoIterator<Item = Route>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let table = RouteTable::new(routes)?;
        let composer = Composer::new(SessionStore::new(&config), clock);
        let chains = table.routes().iter().map(|route| composer.compose(route)).collect();
        Ok(Self { config, table, chains })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    /// Routes one request and produces its response.
    pub async fn handle(&self, mut req: Request) -> Response {
        let matched = match self.table.resolve(req.method(), req.path()) {
            Resolution::Found(matched) => matched,
            Resolution::Redirect(mut to) => {
                if let Some(query) = req.query() {
                    to = format!("{to}?{query}");
                }
                return Response::builder()
                    .status(StatusCode::MOVED_PERMANENTLY)
                    .header("location", &to)
                    .no_body();
            }
            Resolution::MethodNotAllowed(methods) => {
                let allow = methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                return Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("allow", &allow)
                    .text("Method Not Allowed");
            }
            Resolution::NotFound => return Response::error(StatusCode::NOT_FOUND),
        };

        req.set_params(matched.params);
        let mut ctx = Context::new(Arc::clone(matched.route), Arc::clone(&self.config));
        let method = req.method().clone();
        let path = req.path().to_owned();

        let mut resp = match self.chains[matched.index].run(&mut ctx, req).await {
            Ok(resp) => resp,
            // Every chain starts with the error translator, so this is a
            // chain composed without one.
            Err(e) => {
                error!(%method, %path, error = %e, "unhandled chain failure");
                Response::error(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        ctx.into_headers().apply_to(&mut resp);
        resp
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::Method;

    use super::*;

    async fn user(req: Request) -> String {
        format!("user {}", req.param("id").unwrap_or("?"))
    }

    fn app() -> App {
        let config = Arc::new(Config::new("sid", Duration::from_secs(60), "0123456789abcdef0123456789abcdef"));
        App::new(config, [Route::new(Method::GET, "/users/{id}", user)]).unwrap()
    }

    #[tokio::test]
    async fn params_reach_the_handler() {
        let resp = app().handle(Request::new(Method::GET, "/users/7")).await;
        assert_eq!(resp.body(), b"user 7");
        assert_eq!(resp.header("vary"), Some("Accept-Encoding"));
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let resp = app().handle(Request::new(Method::GET, "/nowhere")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trailing_slash_redirects() {
        let resp = app().handle(Request::new(Method::GET, "/users/7/")).await;
        assert_eq!(resp.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.header("location"), Some("/users/7"));
    }

    #[tokio::test]
    async fn trailing_slash_redirect_keeps_the_query() {
        let req = Request::new(Method::GET, "/users/7/").with_query("tab=roles&page=2");
        let resp = app().handle(req).await;
        assert_eq!(resp.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.header("location"), Some("/users/7?tab=roles&page=2"));
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let resp = app().handle(Request::new(Method::POST, "/users/7")).await;
        assert_eq!(resp.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.header("allow"), Some("GET"));
    }

    #[test]
    fn duplicate_routes_fail_at_startup() {
        let config = Arc::new(Config::new("sid", Duration::from_secs(60), "0123456789abcdef0123456789abcdef"));
        let result = App::new(config, [
            Route::new(Method::GET, "/a", user),
            Route::new(Method::GET, "/a", user),
        ]);
        assert!(matches!(result, Err(Error::Route(_))));
    }
}
