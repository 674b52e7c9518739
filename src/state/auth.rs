//! Persisted bearer token and last-known user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The identity provider hands back a token on a callback URL; the CLI
//! extracts it with [`token_from_callback`] and stores it here. `ApiClient`
//! reads the token for every request and calls [`AuthStore::sign_out`] when
//! the backend rejects it, so a stale token never outlives its first 401.
//!
//! The snapshot lives as JSON at `<state_dir>/auth.json`. A missing or
//! unreadable file means "signed out".

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::net::types::CurrentUser;

const TOKEN_QUERY_KEYS: [&str; 2] = ["access_token", "token"];

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth state io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("auth state encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<CurrentUser>,
}

/// Token storage shared by the API client and the CLI.
pub struct AuthStore {
    path: Option<PathBuf>,
    snapshot: RwLock<Option<AuthSnapshot>>,
}

impl AuthStore {
    /// Open the store backed by `path`, loading any existing snapshot.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = load_snapshot(&path);
        Self { path: Some(path), snapshot: RwLock::new(snapshot) }
    }

    /// A store that never touches disk.
    #[must_use]
    pub fn in_memory(token: Option<String>) -> Self {
        let snapshot = token.map(|access_token| AuthSnapshot { access_token, user: None });
        Self { path: None, snapshot: RwLock::new(snapshot) }
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.access_token.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<CurrentUser> {
        self.read().as_ref().and_then(|s| s.user.clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    #[must_use]
    pub fn is_first_login(&self) -> bool {
        self.user().is_some_and(|u| u.is_first_login)
    }

    /// Store a fresh token, replacing any previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn sign_in(&self, access_token: String, user: Option<CurrentUser>) -> Result<(), AuthError> {
        let snapshot = AuthSnapshot { access_token, user };
        self.persist(Some(&snapshot))?;
        *self.write() = Some(snapshot);
        tracing::info!("signed in");
        Ok(())
    }

    /// Refresh the last-known user without touching the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn set_user(&self, user: CurrentUser) -> Result<(), AuthError> {
        let mut guard = self.write();
        let Some(snapshot) = guard.as_mut() else {
            return Ok(());
        };
        snapshot.user = Some(user);
        let updated = snapshot.clone();
        drop(guard);
        self.persist(Some(&updated))
    }

    /// Forget the token and user. Memory is cleared even if the file removal fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot file exists but cannot be removed.
    pub fn sign_out(&self) -> Result<(), AuthError> {
        *self.write() = None;
        tracing::info!("signed out");
        self.persist(None)
    }

    fn persist(&self, snapshot: Option<&AuthSnapshot>) -> Result<(), AuthError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match snapshot {
            Some(snapshot) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, serde_json::to_vec_pretty(snapshot)?)?;
            }
            None => match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<AuthSnapshot>> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<AuthSnapshot>> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_snapshot(path: &Path) -> Option<AuthSnapshot> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable auth snapshot");
            None
        }
    }
}

/// Token found on an identity-provider callback URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackToken {
    pub token: String,
    /// The callback URL with the token parameter removed.
    pub scrubbed_url: String,
}

/// Extract a bearer token from a callback URL's query string.
///
/// Accepts `access_token` or `token`. Returns `None` when the URL does not
/// parse or carries no non-empty token.
#[must_use]
pub fn token_from_callback(raw_url: &str) -> Option<CallbackToken> {
    let mut url = Url::parse(raw_url).ok()?;
    let mut token = None;
    let mut kept = Vec::new();
    for (key, value) in url.query_pairs() {
        if TOKEN_QUERY_KEYS.contains(&key.as_ref()) {
            if token.is_none() && !value.is_empty() {
                token = Some(value.into_owned());
            }
        } else {
            kept.push((key.into_owned(), value.into_owned()));
        }
    }
    let token = token?;

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    Some(CallbackToken { token, scrubbed_url: url.to_string() })
}
