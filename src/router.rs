//! Route descriptors and the route table.
//!
//! One radix tree per HTTP method, O(path-length) lookup. The table is built
//! once at startup from a static, ordered list of [`Route`]s and is read-only
//! afterwards, so concurrent lookups need no synchronisation. A conflicting
//! or malformed pattern is reported by [`RouteTable::new`] before the server
//! ever binds a socket.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use http::Method;
use matchit::{InsertError, Router as MatchitRouter};

use crate::handler::{BoxedHandler, Handler};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route {method} {pattern} is registered twice")]
    Duplicate { method: Method, pattern: String },

    #[error("route {method} {pattern}: {source}")]
    Invalid {
        method: Method,
        pattern: String,
        #[source]
        source: InsertError,
    },
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// Static description of one endpoint.
///
/// ```rust
/// # use gatehouse::{Request, Route};
/// # use http::Method;
/// # async fn list_users(_: Request) -> &'static str { "[]" }
/// let route = Route::new(Method::GET, "/users", list_users).roles(["admin"]);
/// assert!(route.requires_auth());
/// ```
pub struct Route {
    method: Method,
    pattern: String,
    handler: BoxedHandler,
    requires_auth: bool,
    required_roles: BTreeSet<String>,
}

impl Route {
    /// A public route: no session needed, no roles checked.
    pub fn new(method: Method, pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            handler: handler.into_boxed_handler(),
            requires_auth: false,
            required_roles: BTreeSet::new(),
        }
    }

    /// Requires a valid session.
    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Requires a session holding at least one of `roles`.
    ///
    /// A role check without a session is meaningless, so a non-empty role set
    /// also turns authentication on.
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles.extend(roles.into_iter().map(Into::into));
        if !self.required_roles.is_empty() {
            self.requires_auth = true;
        }
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn requires_auth(&self) -> bool { self.requires_auth }
    pub fn required_roles(&self) -> &BTreeSet<String> { &self.required_roles }
    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("requires_auth", &self.requires_auth)
            .field("required_roles", &self.required_roles)
            .finish_non_exhaustive()
    }
}

// ── RouteTable ────────────────────────────────────────────────────────────────

/// A successful lookup.
#[derive(Debug)]
pub struct Matched<'a> {
    /// Registration order of the route, stable for the table's lifetime.
    pub index: usize,
    pub route: &'a Arc<Route>,
    pub params: HashMap<String, String>,
}

/// Everything the dispatcher can learn from a method and path.
#[derive(Debug)]
pub enum Resolution<'a> {
    Found(Matched<'a>),
    /// The path only matches with its trailing slash toggled.
    Redirect(String),
    /// The path exists, under these other methods.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Immutable method + path → [`Route`] index.
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    trees: HashMap<Method, MatchitRouter<usize>>,
}

impl RouteTable {
    /// Builds the table. Registration order is preserved in [`RouteTable::routes`].
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Result<Self, RouteError> {
        let mut table = Self { routes: Vec::new(), trees: HashMap::new() };
        for route in routes {
            table.insert(route)?;
        }
        Ok(table)
    }

    fn insert(&mut self, route: Route) -> Result<(), RouteError> {
        let index = self.routes.len();
        let tree = self.trees.entry(route.method.clone()).or_default();
        if let Err(source) = tree.insert(route.pattern.as_str(), index) {
            return Err(match source {
                InsertError::Conflict { ref with, .. } if *with == route.pattern => {
                    RouteError::Duplicate { method: route.method, pattern: route.pattern }
                }
                source => RouteError::Invalid { method: route.method, pattern: route.pattern, source },
            });
        }
        self.routes.push(Arc::new(route));
        Ok(())
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<Matched<'_>> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        let index = *matched.value;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Matched { index, route: &self.routes[index], params })
    }

    /// [`lookup`](Self::lookup), plus trailing-slash redirects and 405 detection.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        if let Some(matched) = self.lookup(method, path) {
            return Resolution::Found(matched);
        }

        let toggled = toggle_trailing_slash(path);
        if let Some(alt) = &toggled {
            if self.lookup(method, alt).is_some() {
                return Resolution::Redirect(alt.clone());
            }
        }

        let mut allowed: Vec<Method> = self.trees.iter()
            .filter(|(m, _)| *m != method)
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Resolution::NotFound;
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Resolution::MethodNotAllowed(allowed)
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.iter()).finish()
    }
}

fn toggle_trailing_slash(path: &str) -> Option<String> {
    match path.strip_suffix('/') {
        Some("") => None,
        Some(trimmed) => Some(trimmed.to_owned()),
        None => Some(format!("{path}/")),
    }
}
