//! Typed API client with transparent access-token recovery.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every typed call ([`AuthApi`], [`TasksApi`]) funnels through
//! [`ApiClient::execute`], which dispatches, and on a 401 runs the recovery
//! rules below before the caller sees anything:
//!
//! 1. Non-401, or a request that was already replayed once: propagate.
//! 2. The user is on a public page: propagate, no refresh, no redirect.
//! 3. The failing request is itself a refresh: the session is gone. Reject
//!    the queue, go idle, send the user to sign-in, propagate.
//! 4. Otherwise mark the request replayed, then lead or follow the single
//!    in-flight refresh (see [`crate::refresh`]) and replay on success.
//!
//! The coordinator's own refresh call bypasses these rules, so a failed
//! coordinated refresh redirects exactly once.
//!
//! TIMEOUTS
//! ========
//! Each dispatch (first attempt and replay) is bounded by the request
//! timeout. Refresh calls, coordinated or direct, and a follower's wait for
//! one, are bounded by the refresh timeout.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::models::{Credentials, Message, NewTask, Registration, Task, TaskFilter, TaskPatch, TokenPair, User};
use crate::navigation::Navigator;
use crate::refresh::{RefreshCoordinator, Ticket};
use crate::routes::RoutePolicy;
use crate::transport::{
    ApiRequest, HttpTransport, LOGIN_PATH, LOGOUT_PATH, ME_PATH, REFRESH_PATH, REGISTER_PATH, Transport,
};

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
    routes: RoutePolicy,
    refresh: RefreshCoordinator,
    request_timeout: Duration,
    refresh_timeout: Duration,
}

impl ApiClient {
    /// Build a client that talks to `config.base_url` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: &ClientConfig, navigator: Arc<dyn Navigator>) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), navigator, config))
    }

    /// Build a client over any [`Transport`]; timeouts come from `config`.
    #[must_use]
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport,
            navigator,
            routes: RoutePolicy::default(),
            refresh: RefreshCoordinator::new(),
            request_timeout: config.request_timeout,
            refresh_timeout: config.refresh_timeout,
        }
    }

    #[must_use]
    pub fn with_routes(mut self, routes: RoutePolicy) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn routes(&self) -> &RoutePolicy {
        &self.routes
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    #[must_use]
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi { client: self }
    }

    #[must_use]
    pub fn tasks(&self) -> TasksApi<'_> {
        TasksApi { client: self }
    }

    /// Send `request`, recovering from access-token expiry, and decode the
    /// success body as `T`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] left after recovery, or
    /// [`ApiError::Decode`] if the body does not match `T`.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send `request`, recovering from access-token expiry, and return the
    /// raw success body.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] left after recovery.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<String, ApiError> {
        let (deadline, phase) = if request.is_refresh() {
            (self.refresh_timeout, "refresh")
        } else {
            (self.request_timeout, "request")
        };
        loop {
            let error = match self.dispatch(&request, deadline, phase).await {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };
            self.recover(&mut request, error).await?;
        }
    }

    /// Navigate to sign-in unless the user is already on a public page.
    /// Returns whether a navigation happened.
    pub(crate) fn redirect_to_sign_in(&self) -> bool {
        if self.routes.is_public(&self.navigator.current_path()) {
            return false;
        }
        warn!(target_path = self.routes.sign_in(), "session expired; redirecting to sign-in");
        self.navigator.navigate(self.routes.sign_in());
        true
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        deadline: Duration,
        phase: &'static str,
    ) -> Result<String, ApiError> {
        let response = tokio::time::timeout(deadline, self.transport.send(request))
            .await
            .map_err(|_| ApiError::Timeout(phase))??;

        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            retried = request.retried(),
            "api response"
        );

        if response.is_success() {
            Ok(response.body)
        } else {
            Err(ApiError::from_response(response.status, &response.body))
        }
    }

    /// Decide what to do with a failed dispatch. `Ok(())` means replay.
    async fn recover(&self, request: &mut ApiRequest, error: ApiError) -> Result<(), ApiError> {
        if !error.is_unauthorized() || request.retried() {
            return Err(error);
        }

        if self.routes.is_public(&self.navigator.current_path()) {
            debug!(path = %request.path, "401 on a public page; not refreshing");
            return Err(error);
        }

        if request.is_refresh() {
            let rejected = self.refresh.abort(&error);
            warn!(rejected, error = %error, "refresh token rejected");
            self.redirect_to_sign_in();
            return Err(error);
        }

        request.mark_retried();

        match self.refresh.join() {
            Ticket::Follower(outcome) => {
                debug!(path = %request.path, "queued behind in-flight token refresh");
                match tokio::time::timeout(self.refresh_timeout, outcome).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(ApiError::RefreshAbandoned),
                    Err(_) => Err(ApiError::Timeout("refresh")),
                }
            }
            Ticket::Leader(lease) => {
                info!(path = %request.path, "access token rejected; refreshing");
                let refresh = ApiRequest::post(REFRESH_PATH);
                match self.dispatch(&refresh, self.refresh_timeout, "refresh").await {
                    Ok(_) => {
                        let released = lease.succeed();
                        info!(released, "token refresh succeeded");
                        Ok(())
                    }
                    Err(refresh_error) => {
                        let rejected = lease.fail(&refresh_error);
                        warn!(rejected, error = %refresh_error, code = refresh_error.error_code(), "token refresh failed");
                        self.redirect_to_sign_in();
                        Err(refresh_error)
                    }
                }
            }
        }
    }
}

// =============================================================================
// AUTH ENDPOINTS
// =============================================================================

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl AuthApi<'_> {
    /// `POST /auth/register`. Does not sign the new account in.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the server rejects the registration
    /// (e.g. username taken) or the request fails.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<Message, ApiError> {
        let body = Registration {
            username: username.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        };
        self.client
            .call(ApiRequest::post(REGISTER_PATH).json(&body)?)
            .await
    }

    /// `POST /auth/login`. The server sets the session cookies.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] for invalid credentials or a failed request.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let body = Credentials {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        self.client
            .call(ApiRequest::post(LOGIN_PATH).json(&body)?)
            .await
    }

    /// `POST /auth/logout`. The server clears the session cookies.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails.
    pub async fn logout(&self) -> Result<Message, ApiError> {
        self.client.call(ApiRequest::post(LOGOUT_PATH)).await
    }

    /// `POST /auth/refresh`. A 401 here ends the session (redirect to sign-in).
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the refresh cookie is missing or invalid.
    pub async fn refresh(&self) -> Result<TokenPair, ApiError> {
        self.client.call(ApiRequest::post(REFRESH_PATH)).await
    }

    /// `POST /auth/me`.
    ///
    /// # Errors
    ///
    /// Returns a 401 [`ApiError`] when there is no valid session.
    pub async fn me(&self) -> Result<User, ApiError> {
        self.client.call(ApiRequest::post(ME_PATH)).await
    }
}

// =============================================================================
// TASK ENDPOINTS
// =============================================================================

pub struct TasksApi<'a> {
    client: &'a ApiClient,
}

impl TasksApi<'_> {
    /// # Errors
    ///
    /// Returns an [`ApiError`] if validation or the request fails.
    pub async fn create(&self, task: &NewTask) -> Result<Task, ApiError> {
        self.client
            .call(ApiRequest::post("/tasks/").json(task)?)
            .await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails.
    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>, ApiError> {
        self.client
            .call(ApiRequest::post("/tasks/list").query(filter.query_pairs()))
            .await
    }

    /// # Errors
    ///
    /// Returns a 404 [`ApiError`] if the task does not exist for this user.
    pub async fn get(&self, id: i64) -> Result<Task, ApiError> {
        self.client.call(ApiRequest::post(task_path(id, "get"))).await
    }

    /// # Errors
    ///
    /// Returns an [`ApiError`] if the task does not exist or validation fails.
    pub async fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, ApiError> {
        self.client
            .call(ApiRequest::post(task_path(id, "update")).json(patch)?)
            .await
    }

    /// # Errors
    ///
    /// Returns a 404 [`ApiError`] if the task does not exist for this user.
    pub async fn delete(&self, id: i64) -> Result<Message, ApiError> {
        self.client
            .call(ApiRequest::post(task_path(id, "delete")))
            .await
    }
}

fn task_path(id: i64, action: &str) -> String {
    format!("/tasks/{id}/{action}")
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
