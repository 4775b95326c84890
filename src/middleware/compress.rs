//! Gzip response compression.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::StatusCode;

use super::{Middleware, Next};
use crate::context::Context;
use crate::error::ChainError;
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;

/// Gzips response bodies for clients that ask for it.
///
/// `Vary: Accept-Encoding` is staged for every response, compressed or not,
/// so shared caches key on the negotiation header.
///
/// Only responses that come back through this stage are encoded. A failure
/// passes through untouched and the translator outside turns it into a
/// plain, uncompressed 500.
pub struct Compressor {
    level: Compression,
}

impl Compressor {
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl Middleware for Compressor {
    fn name(&self) -> &'static str { "compressor" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        ctx.headers_mut().append("vary", "Accept-Encoding");
        let negotiated = accepts_gzip(req.header("accept-encoding"));

        Box::pin(async move {
            let mut resp = next.run(ctx, req).await?;
            if negotiated && carries_body(&resp) && resp.header("content-encoding").is_none() {
                gzip(&mut resp, self.level)?;
            }
            Ok(resp)
        })
    }
}

/// Replaces the body with its gzip encoding.
///
/// The encoder is finished before returning on the success path and dropped
/// (which finishes it too) on the error path.
fn gzip(resp: &mut Response, level: Compression) -> Result<(), ChainError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(resp.body.len() / 2 + 32), level);
    encoder.write_all(&resp.body).map_err(ChainError::Encode)?;
    resp.body = encoder.finish().map_err(ChainError::Encode)?;
    resp.set_header("content-encoding", "gzip");
    Ok(())
}

/// 1xx, 204 and 304 responses must not carry a body, not even an empty gzip
/// stream.
fn carries_body(resp: &Response) -> bool {
    let status = resp.status_code();
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

/// True when `gzip` appears in `Accept-Encoding` with a non-zero quality.
fn accepts_gzip(header: Option<&str>) -> bool {
    let Some(header) = header else { return false };
    header.split(',').any(|item| {
        let mut parts = item.split(';');
        let coding = parts.next().unwrap_or_default().trim();
        if !coding.eq_ignore_ascii_case("gzip") {
            return false;
        }
        let quality = parts
            .filter_map(|p| p.split_once('='))
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
            .find_map(|(_, q)| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        quality > 0.0
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Arc;
    use std::time::Duration;

    use flate2::read::GzDecoder;
    use http::Method;
    use rstest::rstest;

    use super::*;
    use crate::config::Config;
    use crate::handler::{BoxedHandler, Handler};
    use crate::router::Route;

    async fn body(_req: Request) -> &'static str { "hello hello hello hello" }

    async fn fails(_req: Request) -> Result<Response, std::io::Error> {
        Err(std::io::Error::other("boom"))
    }

    async fn run(endpoint: BoxedHandler, accept: Option<&str>) -> (Outcome, Context) {
        let config = Config::new("sid", Duration::from_secs(60), "0123456789abcdef0123456789abcdef");
        let mut ctx = Context::new(Arc::new(Route::new(Method::GET, "/", body)), Arc::new(config));
        let stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(Compressor::default())];
        let mut req = Request::new(Method::GET, "/");
        if let Some(accept) = accept {
            req = req.with_header("Accept-Encoding", accept);
        }
        let out = Next { stages: &stages, endpoint: &endpoint }.run(&mut ctx, req).await;
        (out, ctx)
    }

    #[rstest]
    #[case("gzip", true)]
    #[case("deflate, gzip;q=0.8", true)]
    #[case("GZIP", true)]
    #[case("gzip;q=0", false)]
    #[case("gzip;Q=0", false)]
    #[case("gzip; Q = 0.5", true)]
    #[case("br, deflate", false)]
    #[case("", false)]
    fn negotiation(#[case] header: &str, #[case] expected: bool) {
        assert_eq!(accepts_gzip(Some(header)), expected);
    }

    #[tokio::test]
    async fn negotiated_body_is_gzipped() {
        let (out, ctx) = run(body.into_boxed_handler(), Some("gzip")).await;
        let resp = out.unwrap();

        assert_eq!(resp.header("content-encoding"), Some("gzip"));
        let mut decoded = String::new();
        GzDecoder::new(resp.body()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "hello hello hello hello");
        assert_eq!(ctx.into_headers().get_all("vary").collect::<Vec<_>>(), vec!["Accept-Encoding"]);
    }

    #[tokio::test]
    async fn plain_request_passes_through_with_vary() {
        let (out, ctx) = run(body.into_boxed_handler(), None).await;
        let resp = out.unwrap();

        assert!(resp.header("content-encoding").is_none());
        assert_eq!(resp.body(), b"hello hello hello hello");
        assert_eq!(ctx.into_headers().get_all("vary").count(), 1);
    }

    #[tokio::test]
    async fn failure_still_stages_vary() {
        let (out, ctx) = run(fails.into_boxed_handler(), Some("gzip")).await;
        assert!(matches!(out, Err(ChainError::Handler(_))));
        assert_eq!(ctx.into_headers().get_all("vary").count(), 1);
    }

    #[tokio::test]
    async fn bodiless_status_is_left_alone() {
        async fn empty(_req: Request) -> StatusCode { StatusCode::NO_CONTENT }
        let (out, _) = run(empty.into_boxed_handler(), Some("gzip")).await;
        let resp = out.unwrap();
        assert!(resp.header("content-encoding").is_none());
        assert!(resp.body().is_empty());
    }

    #[tokio::test]
    async fn rejection_bodies_are_encoded_too() {
        async fn denied(_req: Request) -> Response { Response::error(StatusCode::FORBIDDEN) }
        let (out, _) = run(denied.into_boxed_handler(), Some("gzip")).await;
        assert_eq!(out.unwrap().header("content-encoding"), Some("gzip"));
    }
}
