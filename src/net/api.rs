//! Authenticated JSON-over-HTTP transport for the DreamSearch backend.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `Result<_, ApiError>`; nothing is retried here. A 401
//! or 403 clears the shared [`AuthStore`] before the error is returned, so
//! callers only need to route the user back to sign-in.

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{ApiError, extract_detail};
use super::types::{CurrentUser, UpdateUserRequest, UserId};
use crate::config::{ClientConfig, Timeouts};
use crate::state::auth::AuthStore;
use crate::state::profile::{ProfileError, validate_nickname};

// =============================================================================
// ENDPOINTS
// =============================================================================

pub const CURRENT_USER_PATH: &str = "/auth/me";
pub const COMPLETE_SIGNUP_PATH: &str = "/auth/complete-signup";
pub const SESSIONS_PATH: &str = "/chat/sessions";
pub const ANALYZE_IMAGE_PATH: &str = "/api/v1/pipeline/analyze-image";

pub(crate) fn session_path(session_id: uuid::Uuid) -> String {
    format!("{SESSIONS_PATH}/{session_id}")
}

pub(crate) fn session_messages_path(session_id: uuid::Uuid) -> String {
    format!("{SESSIONS_PATH}/{session_id}/messages")
}

pub(crate) fn user_path(user_id: UserId) -> String {
    format!("/users/users/{user_id}")
}

pub(crate) fn profile_path(user_id: UserId) -> String {
    format!("/users/users/{user_id}/profile")
}

pub(crate) fn check_nickname_path(user_id: UserId) -> String {
    format!("/users/users/{user_id}/check-nickname")
}

pub(crate) fn chat_history_path(user_id: UserId) -> String {
    format!("/users/users/{user_id}/chat-history")
}

pub(crate) fn test_results_path(user_id: UserId) -> String {
    format!("/users/users/{user_id}/test-results")
}

pub(crate) fn analysis_status_path(test_id: i64) -> String {
    format!("/api/v1/pipeline/analysis-status/{test_id}")
}

// =============================================================================
// CLIENT
// =============================================================================

/// Shared HTTP client. Cheap to clone; clones share the connection pool and
/// the auth store.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthStore>,
    timeouts: Timeouts,
}

impl ApiClient {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig, auth: Arc<AuthStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect())
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone(), auth, timeouts: config.timeouts })
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Fetch the signed-in user from `/auth/me` and refresh the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAuthenticated`] without a request when no token
    /// is stored; otherwise any transport or status error.
    pub async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        if !self.auth.is_authenticated() {
            return Err(ApiError::NotAuthenticated);
        }
        let user: CurrentUser = self.get_json(CURRENT_USER_PATH, &[]).await?;
        if let Err(e) = self.auth.set_user(user.clone()) {
            tracing::warn!(error = %e, "failed to persist current user");
        }
        Ok(user)
    }

    /// Finish first-login signup by choosing a nickname.
    ///
    /// The backend stores the name and clears `is_first_login`; the returned
    /// user replaces the stored copy.
    ///
    /// # Errors
    ///
    /// A validation failure without a request, `NotAuthenticated` when no
    /// token is stored, or any transport or status error.
    pub async fn complete_signup(&self, nickname: &str) -> Result<CurrentUser, ProfileError> {
        let nickname = nickname.trim();
        validate_nickname(nickname)?;
        if !self.auth.is_authenticated() {
            return Err(ApiError::NotAuthenticated.into());
        }
        let user: CurrentUser = self
            .post_json(COMPLETE_SIGNUP_PATH, &[], Some(&UpdateUserRequest { nickname }))
            .await?;
        tracing::info!(user_id = user.id, "signup completed");
        if let Err(e) = self.auth.set_user(user.clone()) {
            tracing::warn!(error = %e, "failed to persist current user");
        }
        Ok(user)
    }

    /// `GET path?query` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, path).query(query);
        self.execute(Method::GET, path, builder, self.timeouts.request()).await
    }

    /// `POST path?query` with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn post_json<B, T>(&self, path: &str, query: &[(&str, String)], body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self.request(Method::POST, path).query(query);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(Method::POST, path, builder, self.timeouts.request()).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or bad JSON.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::PUT, path).json(body);
        self.execute(Method::PUT, path, builder, self.timeouts.request()).await
    }

    /// `POST path` with a multipart form, bounded by `timeout`.
    pub(crate) async fn post_multipart<T>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
        timeout: Duration,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::POST, path).multipart(form);
        self.execute(Method::POST, path, builder, timeout).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T>(&self, method: Method, path: &str, builder: RequestBuilder, timeout: Duration) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let secs = timeout.as_secs();
        tracing::debug!(%method, path, "api request");
        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(&e, secs))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(&e, secs))?;

        if status == 401 || status == 403 {
            tracing::warn!(%method, path, status, "backend rejected credentials; signing out");
            if let Err(e) = self.auth.sign_out() {
                tracing::warn!(error = %e, "failed to clear auth state");
            }
            return Err(ApiError::Unauthorized { status });
        }
        if !(200..300).contains(&status) {
            let detail = extract_detail(&text);
            tracing::warn!(%method, path, status, %detail, "api request failed");
            return Err(ApiError::Status { status, detail });
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }
}
