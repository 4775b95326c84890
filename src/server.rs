//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Telling every open connection to finish. Idle keep-alive connections
//!    close at once; busy ones close after their in-flight request.
//! 3. Aborting whatever is still open once the drain timeout elapses.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! A client that disconnects mid-request has its request future dropped by
//! hyper. Any session renewal already staged for that request is lost with
//! it; the client simply keeps its previous cookie.
//!
//! # Request bodies
//!
//! Bodies are buffered before routing, so they are capped at
//! [`Config::max_body_bytes`](crate::Config::max_body_bytes). A declared
//! `Content-Length` over the cap is refused with 413 before any of the body
//! is read; a streamed body is cut off with 413 as soon as it crosses the cap.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::error::{BoxError, Error};
use crate::request::Request;
use crate::response::Response;

/// Stays under the default Kubernetes grace period of 30 s.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(25);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    drain_timeout: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, drain_timeout: DEFAULT_DRAIN_TIMEOUT }
    }

    /// How long shutdown waits for open connections before aborting them.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Starts accepting connections and dispatching them through `app`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by every connection closing or the drain timeout elapsing).
    pub async fn serve(self, app: App) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.run(listener, app, shutdown_signal()).await
    }

    /// [`serve`](Server::serve) on an already bound listener, stopping when
    /// `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, app: App, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        // Route table, chains and signing key are read-only from here on;
        // every connection task gets a clone of the same Arc.
        let app = Arc::new(app);

        info!(
            addr = %listener.local_addr()?,
            routes = app.routes().routes().len(),
            "gatehouse listening"
        );

        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut shutdown => {
                    info!(open = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { dispatch(app, req).await }
                    });

                    // HTTP/1.1 or HTTP/2, whichever the client negotiates.
                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
                    let conn = graceful.watch(conn.into_owned());

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Stop accepting before draining.
        drop(listener);

        match tokio::time::timeout(self.drain_timeout, graceful.shutdown()).await {
            Ok(()) => info!("all connections drained"),
            Err(_) => warn!(
                open = tasks.len(),
                timeout_secs = self.drain_timeout.as_secs(),
                "drain timeout elapsed, aborting remaining connections"
            ),
        }
        tasks.shutdown().await;

        info!("gatehouse stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers the body, hands the request to the app, converts the response.
///
/// Never fails: oversized bodies become 413, unreadable ones 400, and
/// everything past that is the app's responsibility.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match read_body(&parts.headers, body, app.config().max_body_bytes()).await {
        Ok(body) => body,
        Err(status) => {
            debug!(method = %parts.method, path = %parts.uri.path(), %status, "rejecting request body");
            return Ok(Response::error(status).into_inner());
        }
    };

    let mut request = Request::new(parts.method, parts.uri.path()).with_body(body);
    if let Some(query) = parts.uri.query() {
        request = request.with_query(query);
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    Ok(app.handle(request).await.into_inner())
}

/// Collects at most `limit` bytes of `body`.
async fn read_body<B>(headers: &HeaderMap, body: B, limit: usize) -> Result<Bytes, StatusCode>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(StatusCode::PAYLOAD_TOO_LARGE),
        Err(_) => Err(StatusCode::BAD_REQUEST),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C on Windows).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
