//! # gatehouse
//!
//! An API backend whose interesting part is the request pipeline: every
//! route runs behind a chain of stages composed once, at startup, from the
//! route's own access requirements.
//!
//! ```text
//! ErrorTranslator → Compressor → [AuthValidator] → [Authorizer] → handler
//! ```
//!
//! - **ErrorTranslator**: any failure that escapes becomes a bare 500; the
//!   details go to the log, never to the client.
//! - **Compressor**: gzip when the client asks, `Vary: Accept-Encoding` always.
//! - **AuthValidator**: only on routes that require a session. Reads the
//!   signed session cookie, rejects with 401 when it is missing, forged,
//!   invalid or expired, and slides the expiry forward once less than half
//!   the session lifetime remains.
//! - **Authorizer**: only on routes with required roles. 403 unless the
//!   session holds at least one of them.
//!
//! Nothing mutable is shared between requests. The route table, the chains,
//! the config and the signing key are frozen before the first connection is
//! accepted; each request gets its own [`Context`] and its own copy of its
//! session.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::{App, Config, Request, Route, Server};
//! use http::Method;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     let config = Arc::new(Config::from_env()?);
//!     let app = App::new(Arc::clone(&config), [
//!         Route::new(Method::GET, "/public", hello),
//!         Route::new(Method::GET, "/me", hello).authenticated(),
//!         Route::new(Method::DELETE, "/users/{id}", hello).roles(["admin"]),
//!     ])?;
//!     Server::new(config.listen_addr()).serve(app).await
//! }
//!
//! async fn hello(req: Request) -> String {
//!     match req.session() {
//!         Some(s) => format!("hello {}", s.subject_id),
//!         None => "hello stranger".to_owned(),
//!     }
//! }
//! ```

mod app;
mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod api;
pub mod config;
pub mod health;
pub mod middleware;
pub mod session;

pub use app::App;
pub use config::Config;
pub use context::Context;
pub use error::{BoxError, ChainError, DecodeError, Error};
pub use handler::{BoxFuture, Handler, IntoOutcome, Outcome};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Matched, Resolution, Route, RouteError, RouteTable};
pub use server::Server;
pub use session::{Clock, Session, SessionStore, SystemClock};
