//! Chat session state machine for one chat view.
//!
//! SYSTEM CONTEXT
//! ==============
//! A view creates one [`ChatSessionManager`] per character. On mount it
//! either loads an existing session or creates a new one; user input goes
//! through [`ChatSessionManager::send_message`]; the view re-renders from
//! [`ChatSessionManager::snapshot`].
//!
//! ORDERING
//! ========
//! At most one send is in flight (`is_sending`), so replies are appended in
//! send order and the message list stays append-only. Session creation is
//! bound to a `CancellationToken`; `teardown` and `switch_character` cancel
//! it so a late response never lands in a view that has moved on. Sends and
//! loads carry an epoch for the same reason.

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::net::error::ApiError;
use crate::net::types::{CharacterId, ChatMessage, ChatSession, ChatSessionDetail, SendMessageResponse, UserId};
use crate::persona;

// =============================================================================
// BACKEND SEAM
// =============================================================================

/// Conversational backend consumed by the session manager.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn create_session(
        &self,
        owner_id: UserId,
        character_id: CharacterId,
        display_name: Option<&str>,
    ) -> Result<ChatSession, ApiError>;

    async fn load_session(&self, session_id: Uuid) -> Result<ChatSessionDetail, ApiError>;

    async fn send_message(&self, session_id: Uuid, content: &str) -> Result<SendMessageResponse, ApiError>;
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no active session")]
    NoSession,
    #[error("a session is already active")]
    SessionExists,
    #[error("a session is already being created")]
    CreateInFlight,
    #[error("a message is already being sent")]
    SendInFlight,
    #[error("the conversation has ended")]
    ConversationEnded,
    #[error("the view moved on before the response arrived")]
    Cancelled,
    #[error(transparent)]
    Api(#[from] ApiError),
}

// =============================================================================
// STATE
// =============================================================================

/// Read-only view of a chat session, as rendered.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatState {
    pub session: Option<ChatSession>,
    pub messages: Vec<ChatMessage>,
    /// Draft text in the input box.
    pub input: String,
    /// Persona greeting shown until the first reply arrives.
    pub opening_line: Option<String>,
    pub is_creating: bool,
    pub is_sending: bool,
    pub is_loading: bool,
    pub ended: bool,
    pub last_error: Option<String>,
}

impl ChatState {
    /// The most recent assistant message, if any.
    #[must_use]
    pub fn last_reply(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == crate::net::types::SenderRole::Assistant)
    }
}

struct Inner {
    state: ChatState,
    create_token: Option<CancellationToken>,
    /// Bumped whenever the view switches away from the current session.
    epoch: u64,
}

/// Owns one chat view's session, messages, and in-flight flags.
pub struct ChatSessionManager<B> {
    backend: Arc<B>,
    inner: Arc<Mutex<Inner>>,
}

impl<B> Clone for ChatSessionManager<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend), inner: Arc::clone(&self.inner) }
    }
}

impl<B: ChatBackend> ChatSessionManager<B> {
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            inner: Arc::new(Mutex::new(Inner { state: ChatState::default(), create_token: None, epoch: 0 })),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatState {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn session(&self) -> Option<ChatSession> {
        self.lock().state.session.clone()
    }

    #[must_use]
    pub fn input(&self) -> String {
        self.lock().state.input.clone()
    }

    /// Persona greeting shown until the first reply arrives.
    #[must_use]
    pub fn opening_line(&self) -> Option<String> {
        self.lock().state.opening_line.clone()
    }

    pub fn set_input(&self, text: &str) {
        text.clone_into(&mut self.lock().state.input);
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    /// Create a session for `character_id`.
    ///
    /// Only one creation may be in flight; a duplicate call is rejected
    /// without touching the network. If the view is torn down before the
    /// response arrives, the response is discarded.
    ///
    /// # Errors
    ///
    /// `SessionExists`, `CreateInFlight`, `Cancelled`, or the backend error.
    pub async fn create_session(
        &self,
        owner_id: UserId,
        character_id: CharacterId,
        display_name: Option<&str>,
    ) -> Result<ChatSession, ChatError> {
        let token = {
            let mut inner = self.lock();
            if inner.state.session.is_some() {
                return Err(ChatError::SessionExists);
            }
            if inner.state.is_creating {
                return Err(ChatError::CreateInFlight);
            }
            inner.state.is_creating = true;
            let token = CancellationToken::new();
            inner.create_token = Some(token.clone());
            token
        };

        tracing::info!(owner_id, character_id, "creating chat session");
        let result = tokio::select! {
            biased;
            () = token.cancelled() => None,
            res = self.backend.create_session(owner_id, character_id, display_name) => Some(res),
        };

        let mut inner = self.lock();
        if token.is_cancelled() {
            tracing::info!(character_id, "discarding session creation for a torn-down view");
            return Err(ChatError::Cancelled);
        }
        inner.create_token = None;
        inner.state.is_creating = false;

        match result {
            Some(Ok(session)) => {
                tracing::info!(session_id = %session.id, character_id, "chat session created");
                inner.state.session = Some(session.clone());
                inner.state.messages.clear();
                inner.state.ended = false;
                inner.state.last_error = None;
                inner.state.opening_line = Some(persona::pick_opening_line(session.character_id));
                Ok(session)
            }
            Some(Err(e)) => {
                tracing::warn!(character_id, error = %e, "chat session creation failed");
                inner.state.last_error = Some(e.to_string());
                Err(e.into())
            }
            None => Err(ChatError::Cancelled),
        }
    }

    /// Fetch `session_id` with its full message list and replace local state.
    ///
    /// # Errors
    ///
    /// Returns the backend error; local state is left untouched on failure.
    pub async fn load_session(&self, session_id: Uuid) -> Result<ChatSession, ChatError> {
        let epoch = {
            let mut inner = self.lock();
            inner.state.is_loading = true;
            inner.epoch
        };

        let result = self.backend.load_session(session_id).await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            return Err(ChatError::Cancelled);
        }
        inner.state.is_loading = false;
        match result {
            Ok(detail) => {
                let ChatSessionDetail { session, mut messages } = detail;
                messages.sort_by_key(|m| m.created_at);
                tracing::info!(%session_id, count = messages.len(), "chat session loaded");

                if let Some(token) = inner.create_token.take() {
                    token.cancel();
                }
                inner.epoch += 1;
                let opening_line = Some(persona::pick_opening_line(session.character_id));
                inner.state = ChatState {
                    session: Some(session.clone()),
                    messages,
                    input: std::mem::take(&mut inner.state.input),
                    opening_line,
                    ..ChatState::default()
                };
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "chat session load failed");
                inner.state.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Cancel any in-flight creation. Call when the view is unmounted.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        if let Some(token) = inner.create_token.take() {
            token.cancel();
        }
        inner.state.is_creating = false;
        inner.state.is_sending = false;
        inner.state.is_loading = false;
        inner.epoch += 1;
    }

    /// Drop the current session and start over for a different character.
    pub fn switch_character(&self) {
        self.teardown();
        self.lock().state = ChatState::default();
    }

    // -------------------------------------------------------------------------
    // Messaging
    // -------------------------------------------------------------------------

    /// Send `text` and append the echoed message and reply.
    ///
    /// The input draft is cleared as soon as the send is dispatched and is
    /// not restored on failure.
    ///
    /// # Errors
    ///
    /// `EmptyMessage`, `ConversationEnded`, `SendInFlight`, `NoSession`,
    /// `Cancelled`, or the backend error (also recorded as `last_error`).
    pub async fn send_message(&self, text: &str) -> Result<ChatMessage, ChatError> {
        let content = text.trim();
        let (session_id, epoch) = {
            let mut inner = self.lock();
            if content.is_empty() {
                return Err(ChatError::EmptyMessage);
            }
            if inner.state.ended {
                return Err(ChatError::ConversationEnded);
            }
            if inner.state.is_sending {
                return Err(ChatError::SendInFlight);
            }
            let Some(session_id) = inner.state.session.as_ref().map(|s| s.id) else {
                return Err(ChatError::NoSession);
            };
            inner.state.input.clear();
            inner.state.is_sending = true;
            (session_id, inner.epoch)
        };

        let result = self.backend.send_message(session_id, content).await;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::info!(%session_id, "discarding reply for a session the view left");
            return Err(ChatError::Cancelled);
        }
        inner.state.is_sending = false;
        match result {
            Ok(SendMessageResponse { user_message, assistant_message, .. }) => {
                inner.state.messages.push(user_message);
                inner.state.messages.push(assistant_message.clone());
                Ok(assistant_message)
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "send message failed");
                inner.state.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Send whatever is currently in the input draft.
    ///
    /// # Errors
    ///
    /// Same as [`ChatSessionManager::send_message`].
    pub async fn submit_input(&self) -> Result<ChatMessage, ChatError> {
        let draft = self.input();
        self.send_message(&draft).await
    }

    /// Mark the conversation as finished; further sends are rejected.
    pub fn end_conversation(&self) {
        self.lock().state.ended = true;
    }

    pub fn clear_messages(&self) {
        self.lock().state.messages.clear();
    }

    pub fn clear_error(&self) {
        self.lock().state.last_error = None;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
