//! Transport-level error type shared by every backend call.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Errors produced by backend requests.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No bearer token is stored; the call was not attempted.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The backend rejected the bearer token. Local auth state has been cleared.
    #[error("authentication rejected (status {status})")]
    Unauthorized { status: u16 },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The request exceeded its configured time bound.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend returned a non-success status.
    #[error("server returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The response body did not match the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// Local file access failed (e.g. reading an image for upload).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Map a `reqwest` failure, distinguishing timeouts.
    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { secs: timeout_secs }
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }

    /// `true` when the user could reasonably re-issue the action.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Timeout { .. } | Self::Status { status: 429 | 500..=599, .. }
        )
    }

    /// `true` for failures that should send the user back to sign-in.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::Unauthorized { .. })
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend reports failures as `{"detail": "..."}`; anything else is
/// returned as-is.
#[must_use]
pub fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}
