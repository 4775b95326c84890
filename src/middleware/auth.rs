//! Session validation with sliding expiration.
//!
//! Each request on an authenticated route ends in exactly one state:
//!
//! | State            | Cause                                   | Response / cookie          |
//! |------------------|-----------------------------------------|----------------------------|
//! | `NoSession`      | cookie missing, forged, or marked invalid | 401, no cookie write     |
//! | `Expired`        | `now > expires_at`                      | 401, cookie cleared        |
//! | `ValidNoRenewal` | more than half the lifetime remains     | next stage, no cookie write|
//! | `ValidRenewed`   | half the lifetime or less remains       | next stage, fresh cookie   |
//!
//! Renewing only past the half-way mark means an active client rewrites its
//! cookie at most once per half-window instead of on every request.

use std::future::ready;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use http::StatusCode;
use tracing::debug;

use super::{Middleware, Next};
use crate::context::Context;
use crate::handler::{BoxFuture, Outcome};
use crate::request::Request;
use crate::response::Response;
use crate::session::{Clock, ResponseHeaders, Session, SessionStore};

/// Where a request ended up after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoSession,
    Expired,
    ValidNoRenewal,
    ValidRenewed,
}

pub struct AuthValidator {
    store: SessionStore,
    clock: Arc<dyn Clock>,
}

impl AuthValidator {
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Decides the request's [`AuthState`], staging any cookie write on `out`.
    ///
    /// On success returns the session to attach, with `expires_at` already
    /// extended if a renewal happened.
    pub fn evaluate(
        &self,
        req: &Request,
        lifetime: TimeDelta,
        out: &mut ResponseHeaders,
    ) -> Result<(Session, AuthState), AuthState> {
        let mut session = match self.store.fetch(req) {
            Ok(session) if session.valid => session,
            Ok(session) => {
                debug!(subject = %session.subject_id, "session marked invalid");
                return Err(AuthState::NoSession);
            }
            Err(e) => {
                debug!("no usable session: {e}");
                return Err(AuthState::NoSession);
            }
        };

        let now = self.clock.now();
        if now > session.expires_at {
            debug!(subject = %session.subject_id, expired_at = %session.expires_at, "session expired");
            self.store.invalidate(out);
            return Err(AuthState::Expired);
        }

        let remaining = session.expires_at - now;
        if remaining > lifetime / 2 {
            return Ok((session, AuthState::ValidNoRenewal));
        }

        let renewed = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        session.expires_at = renewed.max(session.expires_at);
        self.store.persist(out, &session);
        debug!(subject = %session.subject_id, expires_at = %session.expires_at, "session renewed");
        Ok((session, AuthState::ValidRenewed))
    }
}

impl Middleware for AuthValidator {
    fn name(&self) -> &'static str { "auth_validator" }

    fn handle<'a>(&'a self, ctx: &'a mut Context, req: Request, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        let lifetime = TimeDelta::from_std(ctx.config().session_lifetime()).unwrap_or(TimeDelta::MAX);
        match self.evaluate(&req, lifetime, ctx.headers_mut()) {
            Ok((session, _)) => {
                ctx.attach_session(session);
                next.run(ctx, req)
            }
            Err(_) => Box::pin(ready(Ok(Response::error(StatusCode::UNAUTHORIZED)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use http::Method;
    use rstest::rstest;

    use super::*;
    use crate::config::Config;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> { self.0 }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn validator() -> (AuthValidator, SessionStore) {
        let config = Config::new("__session", Duration::from_secs(1800), "0123456789abcdef0123456789abcdef");
        let store = SessionStore::new(&config);
        (AuthValidator::new(store.clone(), Arc::new(FixedClock(t0()))), store)
    }

    fn request_for(store: &SessionStore, session: &Session) -> Request {
        let token = store.encode(session).unwrap();
        Request::new(Method::GET, "/").with_header("cookie", &format!("__session={token}"))
    }

    fn lifetime() -> TimeDelta {
        TimeDelta::minutes(30)
    }

    #[rstest]
    #[case::five_minutes_left(TimeDelta::minutes(5))]
    #[case::exactly_half(TimeDelta::minutes(15))]
    #[case::one_second_left(TimeDelta::seconds(1))]
    fn renews_at_or_below_half_lifetime(#[case] remaining: TimeDelta) {
        let (validator, store) = validator();
        let req = request_for(&store, &Session::new("u", ["user"], t0() + remaining));
        let mut out = ResponseHeaders::default();

        let (session, state) = validator.evaluate(&req, lifetime(), &mut out).unwrap();

        assert_eq!(state, AuthState::ValidRenewed);
        assert_eq!(session.expires_at, t0() + lifetime());
        assert_eq!(out.get_all("set-cookie").count(), 1);
    }

    #[rstest]
    #[case::twenty_minutes_left(TimeDelta::minutes(20))]
    #[case::just_over_half(TimeDelta::minutes(15) + TimeDelta::seconds(1))]
    fn leaves_fresh_sessions_alone(#[case] remaining: TimeDelta) {
        let (validator, store) = validator();
        let expires_at = t0() + remaining;
        let req = request_for(&store, &Session::new("u", ["user"], expires_at));
        let mut out = ResponseHeaders::default();

        let (session, state) = validator.evaluate(&req, lifetime(), &mut out).unwrap();

        assert_eq!(state, AuthState::ValidNoRenewal);
        assert_eq!(session.expires_at, expires_at);
        assert_eq!(out.get_all("set-cookie").count(), 0);
    }

    #[test]
    fn expired_session_is_rejected_and_cleared() {
        let (validator, store) = validator();
        let req = request_for(&store, &Session::new("u", ["user"], t0() - TimeDelta::minutes(1)));
        let mut out = ResponseHeaders::default();

        assert_eq!(validator.evaluate(&req, lifetime(), &mut out), Err(AuthState::Expired));
        let cookie = out.get_all("set-cookie").next().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn session_expiring_exactly_now_is_still_valid() {
        let (validator, store) = validator();
        let req = request_for(&store, &Session::new("u", ["user"], t0()));
        let mut out = ResponseHeaders::default();

        let (session, state) = validator.evaluate(&req, lifetime(), &mut out).unwrap();
        assert_eq!(state, AuthState::ValidRenewed);
        assert_eq!(session.expires_at, t0() + lifetime());
    }

    #[test]
    fn invalid_flag_means_no_session() {
        let (validator, store) = validator();
        let mut session = Session::new("u", ["user"], t0() + TimeDelta::minutes(20));
        session.valid = false;
        let req = request_for(&store, &session);
        let mut out = ResponseHeaders::default();

        assert_eq!(validator.evaluate(&req, lifetime(), &mut out), Err(AuthState::NoSession));
        assert_eq!(out.get_all("set-cookie").count(), 0);
    }

    #[test]
    fn missing_cookie_means_no_session() {
        let (validator, _) = validator();
        let mut out = ResponseHeaders::default();
        let req = Request::new(Method::GET, "/");

        assert_eq!(validator.evaluate(&req, lifetime(), &mut out), Err(AuthState::NoSession));
    }

    #[test]
    fn renewal_never_moves_expiry_backwards() {
        let (validator, store) = validator();
        // Shorter configured lifetime than the session was issued with.
        let short = TimeDelta::minutes(4);
        let expires_at = t0() + TimeDelta::minutes(1);
        let req = request_for(&store, &Session::new("u", ["user"], expires_at));
        let mut out = ResponseHeaders::default();

        let (session, _) = validator.evaluate(&req, short, &mut out).unwrap();
        assert!(session.expires_at >= expires_at);
    }
}
