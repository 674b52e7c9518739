//! User endpoints: profile (cached), nickname check and update, and the
//! paged chat-history and test-result listings.
//!
//! PAGINATION
//! ==========
//! The backend reports `total` as the size of the returned page and
//! `has_more` as "the page was full", so the real record count is unknown.
//! The listing sources translate that into the lower bound
//! `skip + len (+ 1 if has_more)`, which keeps the paginator's
//! `page * PAGE_SIZE < total` rule correct.

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;

use super::api::{ApiClient, chat_history_path, check_nickname_path, profile_path, test_results_path, user_path};
use super::cache::{PROFILE_CACHE_TTL, TtlCache};
use super::error::ApiError;
use super::types::{
    ChatHistoryEntry, ChatHistoryResponse, NicknameCheckResponse, TestResult, TestResultResponse, UpdateUserRequest,
    UserId, UserProfile, UserProfileResponse,
};
use crate::state::history::{Page, PageSource};
use crate::state::profile::ProfileBackend;

#[derive(Clone)]
pub struct UserService {
    api: ApiClient,
    profiles: Arc<TtlCache<UserId, UserProfile>>,
}

impl UserService {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api, profiles: Arc::new(TtlCache::new(PROFILE_CACHE_TTL)) }
    }

    /// Profile for `user_id`, served from cache for five minutes.
    ///
    /// # Errors
    ///
    /// Any transport or status error from the profile endpoint.
    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile, ApiError> {
        if let Some(cached) = self.profiles.get(&user_id) {
            tracing::debug!(user_id, "profile cache hit");
            return Ok(cached);
        }
        let raw: UserProfileResponse = self.api.get_json(&profile_path(user_id), &[]).await?;
        let profile = UserProfile::from(raw);
        self.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    /// Drop the cached profile so the next read hits the backend.
    pub fn invalidate_profile(&self, user_id: UserId) {
        self.profiles.invalidate(&user_id);
    }

    /// # Errors
    ///
    /// Any transport or status error from the check endpoint.
    pub async fn check_nickname(&self, user_id: UserId, nickname: &str) -> Result<NicknameCheckResponse, ApiError> {
        let query = [("nickname", nickname.to_owned())];
        self.api
            .post_json(&check_nickname_path(user_id), &query, None::<&()>)
            .await
    }

    /// Rename the user. The cached profile is invalidated on success.
    ///
    /// # Errors
    ///
    /// Any transport or status error; a taken nickname is a 400.
    pub async fn update_nickname(&self, user_id: UserId, nickname: &str) -> Result<String, ApiError> {
        let raw: UserProfileResponse = self
            .api
            .put_json(&user_path(user_id), &UpdateUserRequest { nickname })
            .await?;
        self.invalidate_profile(user_id);
        tracing::info!(user_id, "nickname updated");
        Ok(raw.nickname.or(raw.name).unwrap_or_else(|| nickname.to_owned()))
    }

    /// # Errors
    ///
    /// Any transport or status error from the history endpoint.
    pub async fn chat_history(&self, user_id: UserId, skip: usize, limit: usize) -> Result<Page<ChatHistoryEntry>, ApiError> {
        let raw: ChatHistoryResponse = self
            .api
            .get_json(&chat_history_path(user_id), &page_query(skip, limit))
            .await?;
        let items: Vec<ChatHistoryEntry> = raw.chat_history.into_iter().map(ChatHistoryEntry::from).collect();
        let total = lower_bound_total(skip, items.len(), raw.has_more);
        Ok(Page { items, total })
    }

    /// # Errors
    ///
    /// Any transport or status error from the test-results endpoint.
    pub async fn test_results(&self, user_id: UserId, skip: usize, limit: usize) -> Result<Page<TestResult>, ApiError> {
        let raw: TestResultResponse = self
            .api
            .get_json(&test_results_path(user_id), &page_query(skip, limit))
            .await?;
        let items: Vec<TestResult> = raw.test_results.into_iter().map(TestResult::from).collect();
        let total = lower_bound_total(skip, items.len(), raw.has_more);
        Ok(Page { items, total })
    }

    #[must_use]
    pub fn chat_history_source(&self, user_id: UserId) -> ChatHistorySource {
        ChatHistorySource { users: self.clone(), user_id }
    }

    #[must_use]
    pub fn test_result_source(&self, user_id: UserId) -> TestResultSource {
        TestResultSource { users: self.clone(), user_id }
    }
}

fn page_query(skip: usize, limit: usize) -> [(&'static str, String); 2] {
    [("skip", skip.to_string()), ("limit", limit.to_string())]
}

fn lower_bound_total(skip: usize, len: usize, has_more: bool) -> usize {
    skip + len + usize::from(has_more)
}

#[async_trait]
impl ProfileBackend for UserService {
    async fn check_nickname(&self, user_id: UserId, nickname: &str) -> Result<NicknameCheckResponse, ApiError> {
        UserService::check_nickname(self, user_id, nickname).await
    }

    async fn update_nickname(&self, user_id: UserId, nickname: &str) -> Result<String, ApiError> {
        UserService::update_nickname(self, user_id, nickname).await
    }
}

// =============================================================================
// LISTING SOURCES
// =============================================================================

pub struct ChatHistorySource {
    users: UserService,
    user_id: UserId,
}

#[async_trait]
impl PageSource<ChatHistoryEntry> for ChatHistorySource {
    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page<ChatHistoryEntry>, ApiError> {
        self.users.chat_history(self.user_id, skip, limit).await
    }
}

pub struct TestResultSource {
    users: UserService,
    user_id: UserId,
}

#[async_trait]
impl PageSource<TestResult> for TestResultSource {
    async fn fetch_page(&self, skip: usize, limit: usize) -> Result<Page<TestResult>, ApiError> {
        self.users.test_results(self.user_id, skip, limit).await
    }
}
