//! Profile editor: nickname validation, debounced availability checks, and
//! optimistic rename with rollback.
//!
//! STATE MACHINE
//! =============
//! ```text
//! Viewing -> Editing -> Checking -> Checked{Available|Taken|Failed} -> Saving -> Saved -> Viewing
//!               ^___________________________|                           |
//!               |_______________________ (save failed) _________________|
//! ```
//! `cancel` returns to `Viewing` from any editing phase. Local validation
//! failures and a candidate equal to the current name never reach the
//! network.
//!
//! The profile itself lives in a `watch` channel so every view sees the
//! optimistic name during a save and the restored name after a failure.

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::net::error::ApiError;
use crate::net::types::{NicknameCheckResponse, UserId, UserProfile};

/// Quiet period after the last keystroke before an availability check.
pub const NICKNAME_CHECK_DEBOUNCE: Duration = Duration::from_millis(800);
/// How long the "saved" confirmation stays up before returning to viewing.
pub const SAVE_CONFIRMATION_DELAY: Duration = Duration::from_millis(1500);

pub const NICKNAME_MIN_CHARS: usize = 2;
pub const NICKNAME_MAX_CHARS: usize = 20;

const CURRENT_NICKNAME_NOTICE: &str = "현재 사용 중인 닉네임입니다.";
const SAVED_NOTICE: &str = "닉네임이 변경되었습니다.";

// =============================================================================
// BACKEND SEAM
// =============================================================================

#[async_trait]
pub trait ProfileBackend: Send + Sync {
    async fn check_nickname(&self, user_id: UserId, nickname: &str) -> Result<NicknameCheckResponse, ApiError>;

    /// Persist a new nickname and return the name the backend stored.
    async fn update_nickname(&self, user_id: UserId, nickname: &str) -> Result<String, ApiError>;
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NicknameError {
    #[error("nickname must be at least 2 characters")]
    TooShort,
    #[error("nickname must be at most 20 characters")]
    TooLong,
    #[error("nickname may not contain '{0}'")]
    InvalidCharacter(char),
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error(transparent)]
    Nickname(#[from] NicknameError),
    #[error("nickname is already taken")]
    Taken,
    #[error("nickname has not been confirmed available")]
    NotChecked,
    #[error("a save is already in progress")]
    SaveInFlight,
    #[error("not editing")]
    NotEditing,
    #[error("nickname changed before the check finished")]
    Superseded,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Check characters and length. Allowed: Hangul syllables, ASCII letters,
/// digits, and `_`.
///
/// # Errors
///
/// Returns the first rule the candidate breaks.
pub fn validate_nickname(candidate: &str) -> Result<(), NicknameError> {
    let len = candidate.chars().count();
    if len < NICKNAME_MIN_CHARS {
        return Err(NicknameError::TooShort);
    }
    if len > NICKNAME_MAX_CHARS {
        return Err(NicknameError::TooLong);
    }
    match candidate.chars().find(|c| !is_nickname_char(*c)) {
        Some(bad) => Err(NicknameError::InvalidCharacter(bad)),
        None => Ok(()),
    }
}

fn is_nickname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Available,
    Taken,
    /// The check itself failed; see `last_error`.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditPhase {
    #[default]
    Viewing,
    Editing,
    Checking,
    Checked(CheckOutcome),
    Saving,
    /// Confirmation shown; reverts to `Viewing` after [`SAVE_CONFIRMATION_DELAY`].
    Saved,
}

impl EditPhase {
    #[must_use]
    pub fn is_editing(self) -> bool {
        matches!(self, Self::Editing | Self::Checking | Self::Checked(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileEditState {
    pub phase: EditPhase,
    pub candidate: String,
    pub validation_error: Option<NicknameError>,
    /// Server-provided check message or the save confirmation.
    pub notice: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    state: ProfileEditState,
    pending_check: Option<JoinHandle<()>>,
    pending_close: Option<JoinHandle<()>>,
    /// Bumped on every candidate change; stale checks are dropped.
    check_epoch: u64,
}

impl Inner {
    fn abort_pending(&mut self) {
        if let Some(task) = self.pending_check.take() {
            task.abort();
        }
        if let Some(task) = self.pending_close.take() {
            task.abort();
        }
    }
}

pub struct ProfileEditor<B> {
    backend: Arc<B>,
    user_id: UserId,
    profile: Arc<watch::Sender<UserProfile>>,
    inner: Arc<Mutex<Inner>>,
}

impl<B> Clone for ProfileEditor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            user_id: self.user_id,
            profile: Arc::clone(&self.profile),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> ProfileEditor<B>
where
    B: ProfileBackend + 'static,
{
    #[must_use]
    pub fn new(backend: Arc<B>, profile: UserProfile) -> Self {
        let user_id = profile.id;
        let (profile, _) = watch::channel(profile);
        Self { backend, user_id, profile: Arc::new(profile), inner: Arc::new(Mutex::new(Inner::default())) }
    }

    /// The profile as every view currently sees it.
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        self.profile.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UserProfile> {
        self.profile.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProfileEditState {
        self.lock().state.clone()
    }

    /// Open the editor seeded with the current name.
    ///
    /// # Errors
    ///
    /// `SaveInFlight` while a save is pending.
    pub fn begin_edit(&self) -> Result<(), ProfileError> {
        let mut inner = self.lock();
        if inner.state.phase == EditPhase::Saving {
            return Err(ProfileError::SaveInFlight);
        }
        inner.abort_pending();
        inner.check_epoch += 1;
        inner.state = ProfileEditState {
            phase: EditPhase::Editing,
            candidate: self.profile.borrow().name.clone(),
            ..ProfileEditState::default()
        };
        Ok(())
    }

    /// Replace the candidate and reschedule the debounced availability check.
    ///
    /// Must be called from within a Tokio runtime for the debounce to run;
    /// otherwise only [`ProfileEditor::check_now`] checks availability.
    ///
    /// # Errors
    ///
    /// `NotEditing`, or the local validation failure (also kept in state).
    pub fn set_candidate(&self, text: &str) -> Result<(), ProfileError> {
        let mut inner = self.lock();
        if !inner.state.phase.is_editing() {
            return Err(ProfileError::NotEditing);
        }
        inner.abort_pending();
        inner.check_epoch += 1;
        text.clone_into(&mut inner.state.candidate);
        inner.state.validation_error = None;
        inner.state.notice = None;
        inner.state.last_error = None;

        if self.precheck(&mut inner)?.is_none() {
            self.schedule_check(&mut inner);
        }
        Ok(())
    }

    /// Check availability immediately, cancelling any pending debounce.
    ///
    /// # Errors
    ///
    /// `NotEditing`, a validation failure, or `Superseded` if the candidate
    /// changed while the request was out. Backend failures are reported as
    /// `Ok(CheckOutcome::Failed)` with `last_error` set.
    pub async fn check_now(&self) -> Result<CheckOutcome, ProfileError> {
        let epoch = {
            let mut inner = self.lock();
            if !inner.state.phase.is_editing() {
                return Err(ProfileError::NotEditing);
            }
            if let Some(task) = inner.pending_check.take() {
                task.abort();
            }
            inner.check_epoch += 1;
            if let Some(outcome) = self.precheck(&mut inner)? {
                return Ok(outcome);
            }
            inner.check_epoch
        };
        self.run_check(epoch).await
    }

    /// Commit the checked candidate.
    ///
    /// The new name is published before the request goes out; on failure
    /// the previous profile is restored and the editor returns to `Editing`.
    ///
    /// # Errors
    ///
    /// `SaveInFlight`, `NotEditing`, `Taken`, `NotChecked`, or the backend
    /// error.
    pub async fn save(&self) -> Result<UserProfile, ProfileError> {
        let candidate = {
            let mut inner = self.lock();
            match inner.state.phase {
                EditPhase::Saving => return Err(ProfileError::SaveInFlight),
                EditPhase::Checked(CheckOutcome::Available) => {}
                EditPhase::Checked(CheckOutcome::Taken) => return Err(ProfileError::Taken),
                EditPhase::Viewing | EditPhase::Saved => return Err(ProfileError::NotEditing),
                EditPhase::Editing | EditPhase::Checking | EditPhase::Checked(CheckOutcome::Failed) => {
                    return Err(ProfileError::NotChecked);
                }
            }
            inner.abort_pending();
            inner.state.phase = EditPhase::Saving;
            inner.state.candidate.clone()
        };

        let snapshot = self.profile();
        if candidate == snapshot.name {
            self.lock().state = ProfileEditState::default();
            return Ok(snapshot);
        }

        self.profile.send_modify(|p| p.name.clone_from(&candidate));
        tracing::info!(user_id = self.user_id, "saving nickname");

        match self.backend.update_nickname(self.user_id, &candidate).await {
            Ok(stored) => {
                self.profile.send_modify(|p| p.name = stored);
                let mut inner = self.lock();
                inner.state.phase = EditPhase::Saved;
                inner.state.notice = Some(SAVED_NOTICE.to_owned());
                inner.state.last_error = None;
                self.schedule_close(&mut inner);
                Ok(self.profile())
            }
            Err(e) => {
                tracing::warn!(user_id = self.user_id, error = %e, "nickname save failed; restoring profile");
                self.profile.send_replace(snapshot);
                let mut inner = self.lock();
                inner.state.phase = EditPhase::Editing;
                inner.state.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Leave the editor without saving. Ignored while a save is in flight.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if inner.state.phase == EditPhase::Saving {
            return;
        }
        inner.abort_pending();
        inner.check_epoch += 1;
        inner.state = ProfileEditState::default();
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Resolve the candidate locally when possible. `Ok(None)` means the
    /// backend has to be asked.
    fn precheck(&self, inner: &mut Inner) -> Result<Option<CheckOutcome>, NicknameError> {
        if inner.state.candidate == self.profile.borrow().name {
            inner.state.phase = EditPhase::Checked(CheckOutcome::Available);
            inner.state.notice = Some(CURRENT_NICKNAME_NOTICE.to_owned());
            return Ok(Some(CheckOutcome::Available));
        }
        inner.state.phase = EditPhase::Editing;
        if let Err(e) = validate_nickname(&inner.state.candidate) {
            inner.state.validation_error = Some(e.clone());
            return Err(e);
        }
        Ok(None)
    }

    fn schedule_check(&self, inner: &mut Inner) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let editor = self.clone();
        let epoch = inner.check_epoch;
        inner.pending_check = Some(runtime.spawn(async move {
            tokio::time::sleep(NICKNAME_CHECK_DEBOUNCE).await;
            if let Err(e) = editor.run_check(epoch).await {
                tracing::debug!(error = %e, "debounced nickname check dropped");
            }
        }));
    }

    fn schedule_close(&self, inner: &mut Inner) {
        let editor = self.clone();
        inner.pending_close = Some(tokio::spawn(async move {
            tokio::time::sleep(SAVE_CONFIRMATION_DELAY).await;
            let mut inner = editor.lock();
            if inner.state.phase == EditPhase::Saved {
                inner.state = ProfileEditState::default();
            }
        }));
    }

    async fn run_check(&self, epoch: u64) -> Result<CheckOutcome, ProfileError> {
        let candidate = {
            let mut inner = self.lock();
            if inner.check_epoch != epoch {
                return Err(ProfileError::Superseded);
            }
            inner.state.phase = EditPhase::Checking;
            inner.state.candidate.clone()
        };

        let result = self.backend.check_nickname(self.user_id, &candidate).await;

        let mut inner = self.lock();
        if inner.check_epoch != epoch {
            return Err(ProfileError::Superseded);
        }
        let outcome = match result {
            Ok(NicknameCheckResponse { available, message }) => {
                inner.state.notice = (!message.is_empty()).then_some(message);
                if available { CheckOutcome::Available } else { CheckOutcome::Taken }
            }
            Err(e) => {
                tracing::warn!(user_id = self.user_id, error = %e, "nickname check failed");
                inner.state.last_error = Some(e.to_string());
                CheckOutcome::Failed
            }
        };
        inner.state.phase = EditPhase::Checked(outcome);
        Ok(outcome)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
