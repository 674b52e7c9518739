use super::*;
use crate::net::types::SenderRole;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

// =============================================================
// MockChat
// =============================================================

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
}

fn session(character_id: CharacterId) -> ChatSession {
    ChatSession {
        id: Uuid::new_v4(),
        user_id: 7,
        character_id,
        display_name: None,
        is_active: true,
        created_at: at(0),
        updated_at: at(0),
    }
}

fn message(session_id: Uuid, sender: SenderRole, content: &str, secs: i64) -> ChatMessage {
    ChatMessage { id: Uuid::new_v4(), session_id, sender, content: content.to_owned(), created_at: at(secs) }
}

#[derive(Default)]
struct MockChat {
    create_calls: AtomicUsize,
    send_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    create_started: Notify,
    send_started: Notify,
    gate: Mutex<Option<Arc<Notify>>>,
    fail_sends: AtomicBool,
    detail: Mutex<Option<ChatSessionDetail>>,
    created: Mutex<Vec<ChatSession>>,
}

impl MockChat {
    /// Block every backend call until the returned gate is notified.
    fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mock = Self { gate: Mutex::new(Some(Arc::clone(&gate))), ..Self::default() };
        (Arc::new(mock), gate)
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn create_session(
        &self,
        _owner_id: UserId,
        character_id: CharacterId,
        _display_name: Option<&str>,
    ) -> Result<ChatSession, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create_started.notify_one();
        self.wait_gate().await;
        let created = session(character_id);
        self.created.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<ChatSessionDetail, ApiError> {
        let created = self.created.lock().unwrap().iter().find(|s| s.id == session_id).cloned();
        if let Some(session) = created {
            return Ok(ChatSessionDetail { session, messages: Vec::new() });
        }
        self.detail
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::Status { status: 404, detail: "Chat session not found".into() })
    }

    async fn send_message(&self, session_id: Uuid, content: &str) -> Result<SendMessageResponse, ApiError> {
        let n = i64::try_from(self.send_calls.fetch_add(1, Ordering::SeqCst)).unwrap();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.send_started.notify_one();
        self.wait_gate().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Status { status: 500, detail: "AI 응답 생성 실패".into() });
        }
        Ok(SendMessageResponse {
            user_message: message(session_id, SenderRole::User, content, 10 + 2 * n),
            assistant_message: message(session_id, SenderRole::Assistant, &format!("re: {content}"), 11 + 2 * n),
            session_updated: true,
        })
    }
}

async fn manager_with_session() -> (ChatSessionManager<MockChat>, Arc<MockChat>) {
    let mock = Arc::new(MockChat::default());
    let manager = ChatSessionManager::new(Arc::clone(&mock));
    manager.create_session(7, 3, None).await.unwrap();
    (manager, mock)
}

fn contents(state: &ChatState) -> Vec<String> {
    state.messages.iter().map(|m| m.content.clone()).collect()
}

// =============================================================
// ChatState defaults
// =============================================================

#[test]
fn chat_state_default_is_idle() {
    let state = ChatState::default();
    assert!(state.session.is_none());
    assert!(state.messages.is_empty());
    assert!(!state.is_sending && !state.is_creating && !state.ended);
    assert!(state.last_reply().is_none());
}

// =============================================================
// create_session
// =============================================================

#[tokio::test]
async fn create_session_starts_with_empty_messages() {
    let (manager, mock) = manager_with_session().await;

    let state = manager.snapshot();
    let session = state.session.as_ref().unwrap();
    assert_eq!(session.character_id, 3);
    assert!(state.messages.is_empty());
    assert!(!state.is_creating);
    assert_eq!(mock.create_calls.load(Ordering::SeqCst), 1);

    let greeting = state.opening_line.unwrap();
    assert!(persona::find(3).unwrap().opening_lines.contains(&greeting.as_str()));
}

#[tokio::test]
async fn create_session_rejected_when_session_exists() {
    let (manager, mock) = manager_with_session().await;
    let err = manager.create_session(7, 3, None).await.unwrap_err();
    assert!(matches!(err, ChatError::SessionExists));
    assert_eq!(mock.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_create_while_in_flight_skips_network() {
    let (mock, gate) = MockChat::gated();
    let manager = ChatSessionManager::new(Arc::clone(&mock));

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.create_session(7, 1, None).await }
    });
    mock.create_started.notified().await;
    assert!(manager.snapshot().is_creating);

    let err = manager.create_session(7, 1, None).await.unwrap_err();
    assert!(matches!(err, ChatError::CreateInFlight));

    gate.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(mock.create_calls.load(Ordering::SeqCst), 1);
    assert!(!manager.snapshot().is_creating);
}

#[tokio::test]
async fn switching_character_discards_pending_creation() {
    let (mock, gate) = MockChat::gated();
    let manager = ChatSessionManager::new(Arc::clone(&mock));

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.create_session(7, 1, None).await }
    });
    mock.create_started.notified().await;

    manager.switch_character();
    gate.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Cancelled));
    let state = manager.snapshot();
    assert!(state.session.is_none());
    assert!(!state.is_creating);

    // The view is free to start the new character's session.
    *mock.gate.lock().unwrap() = None;
    let created = manager.create_session(7, 2, None).await.unwrap();
    assert_eq!(created.character_id, 2);
    assert_eq!(manager.session().map(|s| s.character_id), Some(2));
}

// =============================================================
// send_message
// =============================================================

#[tokio::test]
async fn send_appends_user_then_assistant() {
    let (manager, _mock) = manager_with_session().await;
    let reply = manager.send_message("  오늘 좀 힘들었어  ").await.unwrap();

    assert_eq!(reply.sender, SenderRole::Assistant);
    let state = manager.snapshot();
    assert_eq!(contents(&state), vec!["오늘 좀 힘들었어", "re: 오늘 좀 힘들었어"]);
    assert_eq!(state.messages[0].sender, SenderRole::User);
    assert_eq!(state.last_reply().map(|m| m.content.as_str()), Some("re: 오늘 좀 힘들었어"));
    assert!(!state.is_sending);
}

#[tokio::test]
async fn sequential_sends_keep_call_order() {
    let (manager, _mock) = manager_with_session().await;
    for text in ["one", "two", "three"] {
        manager.send_message(text).await.unwrap();
    }

    let state = manager.snapshot();
    assert_eq!(contents(&state), vec!["one", "re: one", "two", "re: two", "three", "re: three"]);
    assert!(state.messages.windows(2).all(|w| w[0].created_at < w[1].created_at));
}

#[tokio::test]
async fn send_while_in_flight_is_rejected() {
    let (manager, mock) = manager_with_session().await;
    let gate = Arc::new(Notify::new());
    *mock.gate.lock().unwrap() = Some(Arc::clone(&gate));

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.send_message("first").await }
    });
    mock.send_started.notified().await;
    assert!(manager.snapshot().is_sending);

    let err = manager.send_message("second").await.unwrap_err();
    assert!(matches!(err, ChatError::SendInFlight));

    gate.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(mock.send_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(contents(&manager.snapshot()), vec!["first", "re: first"]);
}

#[tokio::test]
async fn blank_message_never_reaches_backend() {
    let (manager, mock) = manager_with_session().await;
    let err = manager.send_message(" \n\t ").await.unwrap_err();
    assert!(matches!(err, ChatError::EmptyMessage));
    assert_eq!(mock.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn send_without_session_is_rejected() {
    let mock = Arc::new(MockChat::default());
    let manager = ChatSessionManager::new(Arc::clone(&mock));
    manager.set_input("hello");

    let err = manager.submit_input().await.unwrap_err();
    assert!(matches!(err, ChatError::NoSession));
    assert_eq!(mock.send_calls.load(Ordering::SeqCst), 0);
    // Rejected sends leave the draft alone.
    assert_eq!(manager.input(), "hello");
}

#[tokio::test]
async fn ended_conversation_rejects_sends() {
    let (manager, mock) = manager_with_session().await;
    manager.end_conversation();
    let err = manager.send_message("still there?").await.unwrap_err();
    assert!(matches!(err, ChatError::ConversationEnded));
    assert_eq!(mock.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_send_records_error_and_keeps_input_cleared() {
    let (manager, mock) = manager_with_session().await;
    mock.fail_sends.store(true, Ordering::SeqCst);
    manager.set_input("hello");

    let err = manager.submit_input().await.unwrap_err();
    assert!(matches!(err, ChatError::Api(ApiError::Status { status: 500, .. })));

    let state = manager.snapshot();
    assert_eq!(state.input, "");
    assert!(state.messages.is_empty());
    assert!(!state.is_sending);
    assert!(state.last_error.as_deref().unwrap().contains("AI 응답 생성 실패"));
}

#[tokio::test]
async fn clear_error_is_idempotent() {
    let (manager, mock) = manager_with_session().await;
    mock.fail_sends.store(true, Ordering::SeqCst);
    let _ = manager.send_message("hello").await;

    manager.clear_error();
    assert!(manager.snapshot().last_error.is_none());
    manager.clear_error();
    assert!(manager.snapshot().last_error.is_none());
}

#[tokio::test]
async fn reply_for_abandoned_session_is_discarded() {
    let (manager, mock) = manager_with_session().await;
    let gate = Arc::new(Notify::new());
    *mock.gate.lock().unwrap() = Some(Arc::clone(&gate));

    let pending = tokio::spawn({
        let manager = manager.clone();
        async move { manager.send_message("hello").await }
    });
    mock.send_started.notified().await;

    manager.switch_character();
    gate.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ChatError::Cancelled));
    let state = manager.snapshot();
    assert!(state.messages.is_empty());
    assert!(!state.is_sending);
}

// =============================================================
// load_session / local resets
// =============================================================

#[tokio::test]
async fn created_session_loads_back_with_no_messages() {
    let mock = Arc::new(MockChat::default());
    let manager = ChatSessionManager::new(Arc::clone(&mock));
    let created = manager.create_session(7, 2, Some("기쁨이와의 대화")).await.unwrap();

    let fresh = ChatSessionManager::new(Arc::clone(&mock));
    let loaded = fresh.load_session(created.id).await.unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.character_id, 2);

    let state = fresh.snapshot();
    assert_eq!(state.session.map(|s| s.id), Some(created.id));
    assert!(state.messages.is_empty());
    assert!(!state.is_loading);
}

#[tokio::test]
async fn load_session_replaces_state_sorted_by_time() {
    let mock = Arc::new(MockChat::default());
    let loaded = session(4);
    *mock.detail.lock().unwrap() = Some(ChatSessionDetail {
        session: loaded.clone(),
        messages: vec![
            message(loaded.id, SenderRole::Assistant, "second", 20),
            message(loaded.id, SenderRole::User, "first", 10),
            message(loaded.id, SenderRole::User, "third", 30),
        ],
    });
    let manager = ChatSessionManager::new(Arc::clone(&mock));

    manager.load_session(loaded.id).await.unwrap();

    let state = manager.snapshot();
    assert_eq!(state.session.as_ref().map(|s| s.id), Some(loaded.id));
    assert_eq!(contents(&state), vec!["first", "second", "third"]);
    assert!(!state.is_loading);
}

#[tokio::test]
async fn load_session_failure_keeps_state() {
    let (manager, _mock) = manager_with_session().await;
    manager.send_message("hello").await.unwrap();
    let before = manager.snapshot();

    let err = manager.load_session(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ChatError::Api(ApiError::Status { status: 404, .. })));

    let after = manager.snapshot();
    assert_eq!(after.messages, before.messages);
    assert_eq!(after.session, before.session);
    assert!(after.last_error.is_some());
}

#[tokio::test]
async fn clear_messages_keeps_session() {
    let (manager, mock) = manager_with_session().await;
    manager.send_message("hello").await.unwrap();
    manager.clear_messages();

    let state = manager.snapshot();
    assert!(state.messages.is_empty());
    assert!(state.session.is_some());
    assert_eq!(mock.send_calls.load(Ordering::SeqCst), 1);
}
