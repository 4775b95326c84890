//! Signed cookie sessions.
//!
//! A [`Session`] travels to the client inside a cookie whose value is
//!
//! ```text
//! base64url(json(session)) "." base64url(hmac_sha256(key, first_part))
//! ```
//!
//! The client can read the payload but cannot alter it: [`SessionStore::fetch`]
//! recomputes the MAC and rejects anything that does not match. The signing
//! key is derived from the configured secret once at startup and never
//! changes afterwards, so one store is shared by every request.

use std::collections::BTreeSet;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::error;

use crate::config::Config;
use crate::error::DecodeError;
use crate::request::Request;
use crate::response::Response;

type HmacSha256 = Hmac<Sha256>;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const EPOCH_HTTP_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

// ── Session ───────────────────────────────────────────────────────────────────

/// Server-issued proof of authentication.
///
/// A plain value: each request decodes its own copy from its own cookie, and
/// the handler receives a clone. Nothing about a session is shared between
/// requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject_id: String,
    pub roles: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
    pub valid: bool,
}

impl Session {
    pub fn new<I, S>(subject_id: impl Into<String>, roles: I, expires_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject_id: subject_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            expires_at,
            valid: true,
        }
    }

    pub fn has_any_role(&self, required: &BTreeSet<String>) -> bool {
        !self.roles.is_disjoint(required)
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Header staging ────────────────────────────────────────────────────────────

/// Headers a stage wants on the final response, whatever that response
/// turns out to be.
///
/// A stage that renews a session or clears a cookie does so *before* it knows
/// whether an inner stage will succeed, reject, or fail with a 500. Staged
/// headers are applied to whichever response finally leaves the chain.
#[derive(Debug, Default)]
pub struct ResponseHeaders(Vec<(String, String)>);

impl ResponseHeaders {
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0.push((name.to_owned(), value.into()));
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn apply_to(self, resp: &mut Response) {
        for (name, value) in self.0 {
            resp.push_header(&name, value);
        }
    }
}

// ── SessionStore ──────────────────────────────────────────────────────────────

/// Reads and writes the signed session cookie.
#[derive(Clone)]
pub struct SessionStore {
    cookie_name: String,
    secure: bool,
    mac: HmacSha256,
}

impl SessionStore {
    pub fn new(config: &Config) -> Self {
        let mac = <HmacSha256 as Mac>::new_from_slice(config.secret())
            .expect("HMAC accepts any key size");
        Self {
            cookie_name: config.cookie_name().to_owned(),
            secure: config.env() != "dev",
            mac,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Decodes and verifies the session cookie carried by `req`.
    pub fn fetch(&self, req: &Request) -> Result<Session, DecodeError> {
        let raw = req
            .cookie(&self.cookie_name)
            .ok_or_else(|| DecodeError::MissingCookie(self.cookie_name.clone()))?;
        self.decode(raw)
    }

    /// Stages a cookie carrying `session`, expiring when the session does.
    pub fn persist(&self, out: &mut ResponseHeaders, session: &Session) {
        let Some(value) = self.encode(session) else { return };
        let expires = session.expires_at.format(HTTP_DATE);
        out.append("set-cookie", self.cookie(&value, &format!("Expires={expires}")));
    }

    /// Stages a cookie the client must discard immediately.
    pub fn invalidate(&self, out: &mut ResponseHeaders) {
        out.append(
            "set-cookie",
            self.cookie("", &format!("Expires={EPOCH_HTTP_DATE}; Max-Age=0")),
        );
    }

    /// Signs `session` into a cookie value.
    ///
    /// Returns `None` only if serialization fails, which cannot happen for
    /// the field types a session holds; the failure is logged regardless.
    pub fn encode(&self, session: &Session) -> Option<String> {
        let json = match serde_json::to_vec(session) {
            Ok(json) => json,
            Err(e) => {
                error!(subject = %session.subject_id, "session encode failed: {e}");
                return None;
            }
        };
        let payload = URL_SAFE_NO_PAD.encode(json);
        let tag = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        Some(format!("{payload}.{tag}"))
    }

    fn decode(&self, raw: &str) -> Result<Session, DecodeError> {
        let (payload, tag) = raw.split_once('.').ok_or(DecodeError::Malformed)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| DecodeError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).map_err(|_| DecodeError::Signature)?;

        let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| DecodeError::Malformed)?;
        serde_json::from_slice(&json).map_err(|_| DecodeError::Malformed)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn cookie(&self, value: &str, expiry: &str) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={value}; Path=/; HttpOnly{secure}; SameSite=Lax; {expiry}",
            self.cookie_name
        )
    }
}
