//! The service's own endpoints.
//!
//! Credential verification and user storage live outside this crate; the
//! login handler only validates the shape of what it is sent.

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BoxError;
use crate::health;
use crate::request::Request;
use crate::response::Response;
use crate::router::Route;

/// The static route list, in registration order.
pub fn routes() -> Vec<Route> {
    vec![
        Route::new(Method::GET, "/healthz", health::liveness),
        Route::new(Method::GET, "/readyz", health::readiness),
        Route::new(Method::POST, "/auth/login/", login),
        Route::new(Method::GET, "/auth/session/", current_session).authenticated(),
    ]
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub user: String,
    pub password: String,
}

/// `POST /auth/login/`
///
/// Rejects malformed payloads with 400. Well-formed ones get 501 until a
/// credential verifier is wired in; at that point a verified login issues
/// its session through [`SessionStore::persist`](crate::SessionStore::persist).
pub async fn login(req: Request) -> Response {
    let payload: LoginPayload = match req.json() {
        Ok(payload) => payload,
        Err(e) => {
            debug!("rejecting login payload: {e}");
            return Response::error(StatusCode::BAD_REQUEST);
        }
    };
    if payload.user.is_empty() || payload.password.is_empty() {
        return Response::error(StatusCode::BAD_REQUEST);
    }
    Response::error(StatusCode::NOT_IMPLEMENTED)
}

#[derive(Debug, Serialize)]
struct SessionView<'a> {
    subject_id: &'a str,
    roles: Vec<&'a str>,
    expires_at: String,
}

/// `GET /auth/session/`: who the caller is, according to their session.
pub async fn current_session(req: Request) -> Result<Response, BoxError> {
    let session = req.session().ok_or("session missing on an authenticated route")?;
    let view = SessionView {
        subject_id: &session.subject_id,
        roles: session.roles.iter().map(String::as_str).collect(),
        expires_at: session.expires_at.to_rfc3339(),
    };
    Ok(Response::json(serde_json::to_vec(&view)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_login_is_400() {
        let req = Request::new(Method::POST, "/auth/login/").with_body("user=ana");
        assert_eq!(login(req).await.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_missing_fields_is_400() {
        let req = Request::new(Method::POST, "/auth/login/").with_body(r#"{"user":"ana"}"#);
        assert_eq!(login(req).await.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn well_formed_login_is_not_implemented_yet() {
        let req = Request::new(Method::POST, "/auth/login/")
            .with_body(r#"{"user":"ana","password":"hunter2"}"#);
        assert_eq!(login(req).await.status_code(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn session_view_without_session_is_an_error() {
        assert!(current_session(Request::new(Method::GET, "/auth/session/")).await.is_err());
    }
}
