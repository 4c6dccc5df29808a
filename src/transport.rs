//! HTTP transport seam.
//!
//! DESIGN
//! ======
//! A [`Transport`] turns an [`ApiRequest`] into a raw [`ApiResponse`] and
//! reports only transport-level failures as errors; status interpretation
//! (including 401 recovery) belongs to the client. [`HttpTransport`] is the
//! `reqwest` implementation: fixed origin, JSON content type, and a cookie
//! store so the server's httpOnly session cookies ride along on every call.
//! Deadlines are set per request so a refresh is held to the refresh timeout
//! rather than the general request timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::ApiError;

pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const ME_PATH: &str = "/auth/me";

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: reqwest::Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    /// Every endpoint of the task API is a `POST`.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Encode`] if `body` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))?);
        Ok(self)
    }

    #[must_use]
    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.path == REFRESH_PATH
    }

    /// Whether this request has already been through one refresh-and-replay.
    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// =============================================================================
// TRANSPORT TRAIT
// =============================================================================

/// Sends requests to the API origin. Enables mocking in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] only when no HTTP response was obtained.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

// =============================================================================
// REQWEST TRANSPORT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    refresh_timeout: Duration,
}

impl HttpTransport {
    /// Build a cookie-carrying client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the TLS backend or client
    /// builder fails.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
            refresh_timeout: config.refresh_timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Refresh calls get their own deadline; everything else shares the
    /// request deadline.
    fn deadline(&self, request: &ApiRequest) -> (Duration, &'static str) {
        if request.is_refresh() {
            (self.refresh_timeout, "refresh")
        } else {
            (self.request_timeout, "request")
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let (timeout, phase) = self.deadline(request);
        let builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .timeout(timeout);
        let builder = if request.query.is_empty() {
            builder
        } else {
            builder.query(&request.query)
        };
        let builder = if let Some(body) = &request.body {
            builder.json(body)
        } else {
            builder
        };

        let response = builder.send().await.map_err(|e| transport_error(e, phase))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| transport_error(e, phase))?;

        Ok(ApiResponse { status, body })
    }
}

fn transport_error(error: reqwest::Error, phase: &'static str) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout(phase)
    } else {
        ApiError::Transport(error.to_string())
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
