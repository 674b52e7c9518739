//! Chat endpoints on [`ApiClient`].

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use async_trait::async_trait;
use uuid::Uuid;

use super::api::{ApiClient, SESSIONS_PATH, session_messages_path, session_path};
use super::error::ApiError;
use super::types::{
    CharacterId, ChatSession, ChatSessionDetail, CreateSessionRequest, SendMessageRequest, SendMessageResponse, UserId,
};
use crate::state::chat::ChatBackend;

#[async_trait]
impl ChatBackend for ApiClient {
    async fn create_session(
        &self,
        owner_id: UserId,
        character_id: CharacterId,
        display_name: Option<&str>,
    ) -> Result<ChatSession, ApiError> {
        let body = CreateSessionRequest { user_id: owner_id, friends_id: character_id, session_name: display_name };
        self.post_json(SESSIONS_PATH, &[], Some(&body)).await
    }

    async fn load_session(&self, session_id: Uuid) -> Result<ChatSessionDetail, ApiError> {
        self.get_json(&session_path(session_id), &[]).await
    }

    async fn send_message(&self, session_id: Uuid, content: &str) -> Result<SendMessageResponse, ApiError> {
        let body = SendMessageRequest { content };
        self.post_json(&session_messages_path(session_id), &[], Some(&body)).await
    }
}
