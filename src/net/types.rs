//! Backend DTOs and the client-side read models derived from them.
//!
//! DESIGN
//! ======
//! Wire structs keep the backend's field names via `#[serde(rename)]` so the
//! rest of the crate can use domain names (`character_id`, `sender`).
//! History and test-result listings are converted into read models once, at
//! the service boundary, and never written back.
//!
//! Timestamps arrive either naive (`2025-01-02T03:04:05.123456`) or with an
//! offset; naive values are taken as UTC.

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Numeric backend user identifier.
pub type UserId = i64;
/// Numeric backend character (`friends`) identifier.
pub type CharacterId = i64;

// =============================================================================
// AUTH
// =============================================================================

/// User record returned by `GET /auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub is_first_login: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// CHAT
// =============================================================================

/// Author of a chat message. The history endpoint labels replies `ai`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

/// A conversation between one user and one character.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(rename = "chat_sessions_id")]
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(rename = "friends_id")]
    pub character_id: CharacterId,
    #[serde(default, rename = "session_name")]
    pub display_name: Option<String>,
    pub is_active: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A single immutable chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "chat_messages_id")]
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(rename = "sender_type")]
    pub sender: SenderRole,
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Session plus its full message list (`GET /chat/sessions/{id}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub user_id: UserId,
    pub friends_id: CharacterId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<&'a str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub content: &'a str,
}

/// Echoed user message plus the generated reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    #[serde(default)]
    pub session_updated: bool,
}

// =============================================================================
// PROFILE
// =============================================================================

/// Raw profile payload (`GET /users/users/{id}/profile`, `PUT /users/users/{id}`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UserProfileResponse {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub join_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub total_chats: u32,
    #[serde(default)]
    pub total_tests: u32,
}

/// Profile as seen by the rest of the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub join_date: Option<DateTime<Utc>>,
    pub total_tests: u32,
    pub total_chats: u32,
}

impl From<UserProfileResponse> for UserProfile {
    fn from(raw: UserProfileResponse) -> Self {
        let name = raw.name.or(raw.nickname).unwrap_or_default();
        let join_date = raw
            .join_date
            .or(raw.created_at)
            .as_deref()
            .and_then(parse_timestamp);
        Self {
            id: raw.user_id,
            name,
            email: raw.email.unwrap_or_default(),
            join_date,
            total_tests: raw.total_tests,
            total_chats: raw.total_chats,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdateUserRequest<'a> {
    pub nickname: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NicknameCheckResponse {
    pub available: bool,
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// HISTORY LISTINGS
// =============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct ChatHistoryResponse {
    #[serde(default)]
    pub chat_history: Vec<ChatHistoryItem>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatHistoryItem {
    pub id: String,
    pub character_name: String,
    #[serde(default)]
    pub character_avatar: String,
    pub date: String,
    #[serde(default)]
    pub messages: Vec<ChatHistoryItemMessage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatHistoryItemMessage {
    #[serde(default)]
    pub text: Option<String>,
    pub sender: SenderRole,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One past conversation, as listed on the profile page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatHistoryEntry {
    pub id: String,
    pub character_id: String,
    pub character_name: String,
    pub character_avatar: String,
    pub date: String,
    pub last_message: String,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryMessage {
    pub id: String,
    pub sender: SenderRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatHistoryItem> for ChatHistoryEntry {
    fn from(item: ChatHistoryItem) -> Self {
        let mut messages: Vec<HistoryMessage> = item
            .messages
            .into_iter()
            .filter_map(|msg| {
                let raw_ts = msg.timestamp?;
                let timestamp = parse_timestamp(&raw_ts)?;
                Some(HistoryMessage {
                    id: format!("{}-{raw_ts}", item.id),
                    sender: msg.sender,
                    content: msg.text.unwrap_or_default(),
                    timestamp,
                })
            })
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        let last_message = messages.last().map(|m| m.content.clone()).unwrap_or_default();

        // The listing has no character id; the session id stands in for it.
        Self {
            character_id: item.id.clone(),
            id: item.id,
            character_name: item.character_name,
            character_avatar: item.character_avatar,
            date: item.date,
            last_message,
            messages,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestResultResponse {
    #[serde(default)]
    pub test_results: Vec<TestResultItem>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TestResultItem {
    pub id: String,
    pub test_type: String,
    pub character_match: String,
    pub interpretation: String,
    pub date: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Outcome of one drawing test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub id: String,
    pub test_kind: String,
    pub outcome: String,
    pub interpretation: String,
    pub date: String,
    pub images: Vec<String>,
}

impl From<TestResultItem> for TestResult {
    fn from(item: TestResultItem) -> Self {
        Self {
            id: item.id,
            test_kind: item.test_type,
            outcome: item.character_match,
            interpretation: item.interpretation,
            date: item.date,
            images: item.images,
        }
    }
}

// =============================================================================
// DRAWING ANALYSIS
// =============================================================================

/// Response to a drawing upload; analysis continues server-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStarted {
    pub test_id: i64,
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: AnalysisState,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    Processing,
    Completed,
    Failed,
}

impl AnalysisState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub completed: bool,
    #[serde(default)]
    pub current: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    #[serde(default)]
    pub friends_type: Option<CharacterId>,
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub result_text: Option<String>,
    #[serde(default)]
    pub predicted_personality: Option<String>,
    #[serde(default)]
    pub probabilities: HashMap<String, f64>,
}

/// Progress report from `GET /api/v1/pipeline/analysis-status/{test_id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub test_id: i64,
    pub status: AnalysisState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub steps: Vec<AnalysisStep>,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub completed_steps: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub result: Option<AnalysisOutcome>,
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Parse an ISO-8601 timestamp with or without a UTC offset.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
}
