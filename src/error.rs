//! Error types.
//!
//! Three families live here, and they never mix:
//!
//! - [`Error`]: infrastructure and startup failures: binding a port, a bad
//!   config value, a conflicting route. These stop the process before it
//!   serves traffic.
//! - [`DecodeError`]: the client sent something unreadable: a session cookie
//!   that is missing, mangled or forged, or a request body that does not
//!   parse. Answered locally (401 or 400); never escalated.
//! - [`ChainError`]: something failed *inside* the middleware chain and the
//!   client must get a 500. Only the error translator consumes these.

use crate::config::ConfigError;
use crate::router::RouteError;

/// Boxed error a business handler may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Startup and transport failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// A session cookie or request payload could not be read.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("session cookie `{0}` not present")]
    MissingCookie(String),

    #[error("session cookie is malformed")]
    Malformed,

    #[error("session cookie signature mismatch")]
    Signature,

    #[error("malformed request payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A failure that escapes a chain stage and must become a 500.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// A stage ran without a precondition an earlier stage should have
    /// established, e.g. the authorizer found no session in the context.
    #[error("{stage} ran without {missing}")]
    InternalContract {
        stage: &'static str,
        missing: &'static str,
    },

    /// The response body could not be encoded.
    #[error("response encoding failed: {0}")]
    Encode(#[source] std::io::Error),

    /// The business handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),
}
