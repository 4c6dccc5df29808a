//! Cached session state for a UI layer.
//!
//! SYSTEM CONTEXT
//! ==============
//! [`SessionContext`] is the single answer to "who is signed in". It owns a
//! `watch` channel of [`Session`] snapshots; the only writers are the
//! operations below and the termination signal from the refresh coordinator,
//! which clears the user when a refresh fails for good.
//!
//! An identity check that fails for any reason other than 401 keeps the
//! cached user. A flaky network must not sign anyone out.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::User;
use crate::notify::{Notification, Notifier};

const SIGNED_IN: &str = "Signed in";
const ACCOUNT_CREATED: &str = "Account created";
const SIGN_IN_FAILED: &str = "Sign-in failed";
const REGISTRATION_FAILED: &str = "Registration failed";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    /// An identity check is in flight.
    pub loading: bool,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

pub struct SessionContext {
    client: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<Session>,
    terminations: Mutex<watch::Receiver<u64>>,
}

impl SessionContext {
    /// Context with no user and `loading` set; nothing has been checked yet.
    #[must_use]
    pub fn new(client: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        let terminations = client.coordinator().subscribe_terminations();
        let (state, _) = watch::channel(Session {
            user: None,
            loading: true,
        });
        Self {
            client,
            notifier,
            state,
            terminations: Mutex::new(terminations),
        }
    }

    /// Create the context and run the initial identity check.
    pub async fn mount(client: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        let context = Self::new(client, notifier);
        context.check_identity().await;
        context
    }

    #[must_use]
    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Current snapshot.
    #[must_use]
    pub fn session(&self) -> Session {
        self.absorb_terminations();
        self.state.borrow().clone()
    }

    /// Follow session changes. Pair with [`SessionContext::watch_terminations`]
    /// so a failed refresh shows up here without anyone polling.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.absorb_terminations();
        self.state.subscribe()
    }

    /// Ask the server who we are and cache the answer.
    pub async fn check_identity(&self) -> Session {
        self.state.send_modify(|s| s.loading = true);

        let result = self.client.auth().me().await;
        self.absorb_terminations();

        self.state.send_modify(|s| {
            s.loading = false;
            match result {
                Ok(user) => {
                    debug!(user_id = user.id, "identity confirmed");
                    s.user = Some(user);
                }
                Err(ref e) if e.is_unauthorized() => {
                    debug!("no session");
                    s.user = None;
                }
                Err(ref e) => {
                    warn!(error = %e, code = e.error_code(), "identity check failed; keeping cached user");
                }
            }
        });
        self.state.borrow().clone()
    }

    /// Sign in and populate the cached user.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from the login call (bad credentials, network).
    /// Cached state is left as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        match self.client.auth().login(username, password).await {
            Ok(_) => {
                let session = self.check_identity().await;
                info!(username, "signed in");
                self.notifier.notify(Notification::success(SIGNED_IN));
                Ok(session)
            }
            Err(e) => {
                warn!(username, error = %e, "sign-in failed");
                self.notifier
                    .notify(Notification::error(e.detail().unwrap_or(SIGN_IN_FAILED)));
                Err(e)
            }
        }
    }

    /// Create an account. The new account is not signed in.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] from the register call (e.g. username taken).
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<(), ApiError> {
        match self.client.auth().register(username, email, password).await {
            Ok(_) => {
                info!(username, "account created");
                self.notifier.notify(Notification::success(ACCOUNT_CREATED));
                Ok(())
            }
            Err(e) => {
                warn!(username, error = %e, "registration failed");
                self.notifier
                    .notify(Notification::error(e.detail().unwrap_or(REGISTRATION_FAILED)));
                Err(e)
            }
        }
    }

    /// Sign out locally no matter what the server says, then go to sign-in.
    pub async fn logout(&self) {
        if let Err(e) = self.client.auth().logout().await {
            warn!(error = %e, "logout request failed; clearing session anyway");
        }
        self.clear_user();
        let sign_in = self.client.routes().sign_in();
        self.client.navigator().navigate(sign_in);
    }

    /// The user moved to `path`. Protected pages re-check identity and bounce
    /// to sign-in when nobody is signed in.
    pub async fn route_changed(&self, path: &str) -> Session {
        if !self.client.routes().requires_session(path) {
            return self.session();
        }

        let session = self.check_identity().await;
        if !session.is_authenticated() {
            self.client.redirect_to_sign_in();
        }
        session
    }

    /// Clear the user every time a refresh fails for good. Runs until the
    /// client's coordinator goes away.
    pub async fn watch_terminations(&self) {
        let mut terminations = self.client.coordinator().subscribe_terminations();
        while terminations.changed().await.is_ok() {
            debug!("session terminated by failed refresh");
            self.clear_user();
        }
    }

    fn absorb_terminations(&self) {
        let terminated = {
            let mut rx = self
                .terminations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = rx.has_changed().unwrap_or(false);
            if changed {
                rx.borrow_and_update();
            }
            changed
        };
        if terminated {
            self.clear_user();
        }
    }

    fn clear_user(&self) {
        self.state.send_if_modified(|s| s.user.take().is_some());
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
