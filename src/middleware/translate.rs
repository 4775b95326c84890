//! Turns chain failures into a generic 500.

use http::StatusCode;
use tracing::error;

use super::{Middleware, Next};
use crate::context::Context;
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;

/// Outermost stage. The client gets a bare `500 Internal Server Error`; the
/// operator gets the full error in the log, with method and path.
///
/// The 500 is built outside the compressor, so it is never gzipped. It still
/// carries the `Vary` header the compressor staged.
pub struct ErrorTranslator;

impl Middleware for ErrorTranslator {
    fn name(&self) -> &'static str { "error_translator" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let method = req.method().clone();
        let path = req.path().to_owned();

        Box::pin(async move {
            match next.run(ctx, req).await {
                Ok(resp) => Ok(resp),
                Err(e) => {
                    error!(%method, %path, error = %e, "request failed");
                    Ok(Response::error(StatusCode::INTERNAL_SERVER_ERROR))
                }
            }
        })
    }
}
