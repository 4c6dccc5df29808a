//! Client error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! Every failure a caller can see is an [`ApiError`]. The type is `Clone`
//! because one failed refresh rejects every request queued behind it with
//! the same error.

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by API client operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Transport(String),

    /// A deadline expired while waiting for the named phase.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// The request body could not be serialized.
    #[error("request encode failed: {0}")]
    Encode(String),

    /// The response body did not match the expected shape.
    #[error("response parse failed: {0}")]
    Decode(String),

    /// The caller driving a token refresh went away before it settled.
    #[error("token refresh abandoned before it settled")]
    RefreshAbandoned,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

pub const UNAUTHORIZED: u16 = 401;

impl ApiError {
    /// Build a status error from a non-success response body.
    ///
    /// The server reports failures as `{"detail": ...}`; a string detail is
    /// used verbatim and structured details (validation errors) are kept as
    /// compact JSON. Bodies without `detail` fall back to the raw text, then
    /// to the canonical reason phrase.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let detail = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => match map.get("detail") {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            },
            _ => None,
        };

        let detail = detail
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            })
            .unwrap_or_else(|| reason_phrase(status).to_owned());

        Self::Status { status, detail }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(UNAUTHORIZED)
    }

    /// Server-provided failure message, suitable for a user notification.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => Some(detail),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Status { .. } => "E_STATUS",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Encode(_) => "E_ENCODE",
            Self::Decode(_) => "E_DECODE",
            Self::RefreshAbandoned => "E_REFRESH_ABANDONED",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// Whether a caller may reasonably try the same call again later.
    /// The client itself never retries these.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Status { status: 429 | 500..=599, .. }
        )
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("request failed")
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
