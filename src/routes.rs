//! Public/protected route classification.
//!
//! SYSTEM CONTEXT
//! ==============
//! One [`RoutePolicy`] is shared by the edge gate ([`RoutePolicy::gate`]),
//! the 401 interceptor (no refresh on public pages) and the session context
//! (identity checks only on protected pages), so the three can't drift.

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;

pub const SIGN_IN_PATH: &str = "/sign-in";
pub const SIGN_UP_PATH: &str = "/sign-up";
pub const TASKS_PATH: &str = "/tasks";

/// Outcome of the edge gate for one navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    Redirect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePolicy {
    public: Vec<String>,
    protected: Vec<String>,
    sign_in: String,
    home: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new([SIGN_IN_PATH, SIGN_UP_PATH], [TASKS_PATH], SIGN_IN_PATH, TASKS_PATH)
    }
}

impl RoutePolicy {
    #[must_use]
    pub fn new<P, Q>(public: P, protected: Q, sign_in: &str, home: &str) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        Self {
            public: public.into_iter().map(Into::into).collect(),
            protected: protected.into_iter().map(Into::into).collect(),
            sign_in: sign_in.to_owned(),
            home: home.to_owned(),
        }
    }

    /// Pages reachable without a session (sign-in, sign-up).
    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|route| matches_route(path, route))
    }

    #[must_use]
    pub fn requires_session(&self, path: &str) -> bool {
        self.protected.iter().any(|route| matches_route(path, route))
    }

    #[must_use]
    pub fn sign_in(&self) -> &str {
        &self.sign_in
    }

    #[must_use]
    pub fn home(&self) -> &str {
        &self.home
    }

    /// Edge gate run before a page loads.
    ///
    /// Session presence is inferred from the refresh cookie alone: an expired
    /// access token is still recoverable, so it must not bounce the user.
    #[must_use]
    pub fn gate(&self, path: &str, has_refresh_cookie: bool) -> GateDecision {
        if self.requires_session(path) && !has_refresh_cookie {
            return GateDecision::Redirect(self.sign_in.clone());
        }
        if self.is_public(path) && has_refresh_cookie {
            return GateDecision::Redirect(self.home.clone());
        }
        GateDecision::Continue
    }
}

/// Segment-aware prefix match: `/tasks` covers `/tasks` and `/tasks/3`,
/// not `/tasksearch`.
fn matches_route(path: &str, route: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.strip_prefix(route) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || route.ends_with('/'),
        None => false,
    }
}
